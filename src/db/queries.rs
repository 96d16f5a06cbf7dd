use crate::models::{
    AllocationSubmission, CandidateLineItem, CounterpartPrice, SourceDocument, SourceReference,
};
use sqlx::PgPool;

/// 统计匹配的来源单据数量
pub async fn count_documents(pool: &PgPool, text: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT count(*)
        FROM t_source_document d
        WHERE $1 = ''
           OR d.reference_code ILIKE '%' || $1 || '%'
           OR d.counterparty_name ILIKE '%' || $1 || '%'
        "#
    )
    .bind(text)
    .fetch_one(pool)
    .await
}

/// 分页查询来源单据 (limit 为 None 时返回全部)
pub async fn search_documents(
    pool: &PgPool,
    text: &str,
    limit: Option<i64>,
    offset: i64,
) -> Result<Vec<SourceDocument>, sqlx::Error> {
    sqlx::query_as::<_, SourceDocument>(
        r#"
        SELECT d.id, d.date, d.counterparty_name, d.reference_code
        FROM t_source_document d
        WHERE $1 = ''
           OR d.reference_code ILIKE '%' || $1 || '%'
           OR d.counterparty_name ILIKE '%' || $1 || '%'
        ORDER BY d.date DESC, d.id DESC
        LIMIT $2 OFFSET $3
        "#
    )
    .bind(text)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// 统计单据上匹配的物料行数量
pub async fn count_candidate_items(
    pool: &PgPool,
    source_document_id: i64,
    text: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT count(*)
        FROM t_source_document_item i
        WHERE i.document_id = $1
          AND ($2 = ''
               OR i.item_code ILIKE '%' || $2 || '%'
               OR i.item_name ILIKE '%' || $2 || '%')
        "#
    )
    .bind(source_document_id)
    .bind(text)
    .fetch_one(pool)
    .await
}

/// 分页查询单据上的候选物料行 (按行号排序，保证结果稳定)
pub async fn search_candidate_items(
    pool: &PgPool,
    source_document_id: i64,
    text: &str,
    limit: Option<i64>,
    offset: i64,
) -> Result<Vec<CandidateLineItem>, sqlx::Error> {
    sqlx::query_as::<_, CandidateLineItem>(
        r#"
        SELECT i.document_id as source_document_id,
               i.item_code,
               i.item_name,
               i.quantity,
               i.unit,
               i.unit_price as unit_cost,
               i.remark
        FROM t_source_document_item i
        WHERE i.document_id = $1
          AND ($2 = ''
               OR i.item_code ILIKE '%' || $2 || '%'
               OR i.item_name ILIKE '%' || $2 || '%')
        ORDER BY i.line_no, i.id
        LIMIT $3 OFFSET $4
        "#
    )
    .bind(source_document_id)
    .bind(text)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// 查询对照价格 (报价单 / 价目表)
pub async fn find_counterpart_price(
    pool: &PgPool,
    item_code: &str,
    reference: &str,
) -> Result<Option<CounterpartPrice>, sqlx::Error> {
    sqlx::query_as::<_, CounterpartPrice>(
        r#"
        SELECT p.item_code, p.reference_code as reference, p.unit_price
        FROM t_counterpart_price p
        WHERE p.item_code = $1
          AND p.reference_code = $2
        ORDER BY p.effective_date DESC
        LIMIT 1
        "#
    )
    .bind(item_code)
    .bind(reference)
    .fetch_optional(pool)
    .await
}

/// 来源单据引用以 JSON 文本保存
pub fn encode_sources(sources: &[SourceReference]) -> Result<String, sqlx::Error> {
    serde_json::to_string(sources).map_err(|e| sqlx::Error::Protocol(format!("来源单据序列化失败: {}", e)))
}

/// 写入分摊单: 表头 + 批量明细 (同一事务)
pub async fn insert_allocation(
    pool: &PgPool,
    submission: &AllocationSubmission,
) -> Result<i64, sqlx::Error> {
    tracing::debug!("开始写入分摊单, {} 条明细", submission.rows.len());
    let start_time = std::time::Instant::now();

    let sources = encode_sources(&submission.header.sources)?;
    let mut tx = pool.begin().await?;
    let summary = &submission.summary;

    let allocation_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO t_allocation (
            fdate, fsources, fnote, fadditionalcost,
            ftotalcost, ftotalsales, fprofit, fmarginpercent, frowcount
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING fid
        "#
    )
    .bind(submission.header.date)
    .bind(sources)
    .bind(&submission.header.note)
    .bind(submission.header.additional_cost.clone())
    .bind(summary.total_cost.clone())
    .bind(summary.total_sales.clone())
    .bind(summary.profit.clone())
    .bind(summary.margin_percent.clone())
    .bind(summary.row_count as i64)
    .fetch_one(&mut *tx)
    .await?;

    // 每1000条分块插入明细
    for chunk in submission.rows.chunks(1000) {
        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO t_allocation_row (
                fallocationid, fbucket, flineno, fdocumentid,
                fitemcode, fitemname, fqty, funit,
                funitcost, ftotalcost, funitsaleprice, ftotalsaleprice,
                fmarginpercent, fremark
            ) "
        );

        query_builder.push_values(chunk, |mut b, tagged| {
            let row = &tagged.row;
            b.push_bind(allocation_id)
                .push_bind(tagged.bucket.as_str())
                .push_bind(tagged.line_no as i32)
                .push_bind(row.source_document_id)
                .push_bind(&row.item_code)
                .push_bind(&row.item_name)
                .push_bind(row.quantity.clone())
                .push_bind(&row.unit)
                .push_bind(row.unit_cost.clone())
                .push_bind(row.total_cost.clone())
                .push_bind(row.unit_sale_price.clone())
                .push_bind(row.total_sale_price.clone())
                .push_bind(row.margin_percent.clone())
                .push_bind(&row.remark);
        });

        // 添加超时控制: 30秒
        let execute_result = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            query_builder.build().execute(&mut *tx),
        )
        .await;

        match execute_result {
            Ok(Ok(result)) => {
                tracing::debug!("明细写入 {} 行", result.rows_affected());
            }
            Ok(Err(e)) => {
                tracing::error!("✗ 明细写入失败: {:?}", e);
                return Err(e);
            }
            Err(_) => {
                tracing::error!("✗ 明细写入超时 (>30秒)!");
                return Err(sqlx::Error::PoolTimedOut);
            }
        }
    }

    tx.commit().await?;
    tracing::info!(
        "✓ 分摊单 {} 写入成功, {} 条明细, 耗时: {:?}",
        allocation_id,
        submission.rows.len(),
        start_time.elapsed()
    );
    Ok(allocation_id)
}
