//! Reference data written to the store at startup: the monitored sources and
//! the concept → instrument catalog used by enrichment.
//!
//! Seeding is idempotent: sources upsert by name, instruments by code.

use anyhow::{Context, Result};
use tracing::info;

use crate::model::{Instrument, Source, SourceKind};
use crate::store::Store;

pub fn default_sources() -> Vec<Source> {
    vec![
        Source::new("新浪财经", "https://finance.sina.com.cn/", SourceKind::SinaFinance),
        Source::new("中国证券网", "http://www.cnstock.com/", SourceKind::Cnstock),
        Source::new("中国证监会", "http://www.csrc.gov.cn/", SourceKind::Csrc),
        Source::new("上海证券交易所", "http://www.sse.com.cn/", SourceKind::Sse),
        Source::new("深圳证券交易所", "http://www.szse.cn/", SourceKind::Szse),
        Source::new("国家统计局", "http://www.stats.gov.cn/", SourceKind::Stats),
    ]
}

pub fn default_instruments() -> Vec<Instrument> {
    vec![
        Instrument::new("300750", "宁德时代", "新能源", &["锂电池", "储能", "新能源汽车"]),
        Instrument::new("002466", "天齐锂业", "新能源", &["锂电池", "锂矿"]),
        Instrument::new("600519", "贵州茅台", "消费", &["白酒", "消费升级"]),
        Instrument::new("000858", "五粮液", "消费", &["白酒", "消费升级"]),
        Instrument::new("000001", "平安银行", "金融", &["银行", "金融科技"]),
        Instrument::new("600036", "招商银行", "金融", &["银行", "零售银行"]),
        Instrument::new("600900", "长江电力", "公用事业", &["水电", "清洁能源"]),
        Instrument::new("601318", "中国平安", "金融", &["保险", "金融科技"]),
        Instrument::new("000002", "万科A", "地产", &["房地产开发", "物业管理"]),
    ]
}

/// Sector → concept map offered to the model as vocabulary hints.
pub const SECTOR_CONCEPTS: &[(&str, &[&str])] = &[
    ("新能源", &["锂电池", "储能", "光伏", "风电", "新能源汽车", "充电桩"]),
    ("半导体", &["芯片", "集成电路", "晶圆", "封测", "设备材料"]),
    ("医药", &["创新药", "医疗器械", "疫苗", "CXO", "医疗服务"]),
    ("军工", &["航空航天", "军工电子", "船舶", "兵器"]),
    ("消费", &["白酒", "食品饮料", "家电", "纺织服装", "零售"]),
    ("科技", &["人工智能", "云计算", "大数据", "5G", "物联网"]),
    ("金融", &["银行", "保险", "券商", "信托"]),
    ("地产", &["房地产开发", "物业管理", "建筑材料"]),
    ("基建", &["建筑", "水泥", "钢铁", "工程机械"]),
    ("化工", &["石油化工", "精细化工", "农药化肥"]),
];

pub async fn seed_store(store: &dyn Store) -> Result<()> {
    let sources = default_sources();
    let n_sources = sources.len();
    for s in sources {
        let name = s.name.clone();
        store
            .upsert_source(s)
            .await
            .with_context(|| format!("seeding source {name}"))?;
    }

    let instruments = default_instruments();
    let n_instruments = instruments.len();
    for i in instruments {
        let code = i.code.clone();
        store
            .upsert_instrument(i)
            .await
            .with_context(|| format!("seeding instrument {code}"))?;
    }

    info!(sources = n_sources, instruments = n_instruments, "reference data seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::is_instrument_code;
    use crate::store::MemoryStore;

    #[test]
    fn seed_codes_are_well_formed() {
        assert!(default_instruments()
            .iter()
            .all(|i| is_instrument_code(&i.code)));
    }

    #[tokio::test]
    async fn seeding_twice_does_not_duplicate() {
        let store = MemoryStore::new();
        seed_store(&store).await.unwrap();
        seed_store(&store).await.unwrap();
        assert_eq!(
            store.active_sources().await.unwrap().len(),
            default_sources().len()
        );
        assert_eq!(
            store.instruments().await.unwrap().len(),
            default_instruments().len()
        );
    }
}
