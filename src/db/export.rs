use crate::models::TaggedRow;
use bigdecimal::BigDecimal;
use std::io::Write;

const HEADER: [&str; 13] = [
    "bucket",
    "line_no",
    "source_document_id",
    "item_code",
    "item_name",
    "quantity",
    "unit",
    "unit_cost",
    "total_cost",
    "unit_sale_price",
    "total_sale_price",
    "margin_percent",
    "remark",
];

/// 将 Option<BigDecimal> 转换为 CSV 字符串，缺失为空 (不是 0)
fn option_to_csv(val: &Option<BigDecimal>) -> String {
    val.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// 导出分摊行到任意 writer
pub fn write_csv<W: Write>(rows: &[TaggedRow], writer: W) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(HEADER)?;

    for tagged in rows {
        let row = &tagged.row;
        writer.write_record(&[
            tagged.bucket.to_string(),
            tagged.line_no.to_string(),
            row.source_document_id.to_string(),
            row.item_code.clone(),
            row.item_name.clone(),
            row.quantity.to_string(),
            row.unit.clone(),
            row.unit_cost.to_string(),
            row.total_cost.to_string(),
            option_to_csv(&row.unit_sale_price),
            option_to_csv(&row.total_sale_price),
            option_to_csv(&row.margin_percent),
            row.remark.clone().unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
