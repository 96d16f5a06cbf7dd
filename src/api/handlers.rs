use crate::api::AppState;
use crate::db::write_csv;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    AggregateSummary, AllocationRow, AllocationSubmission, Bucket, BucketSubtotal,
    CandidateLineItem, CounterpartPrice, Page, PageSize, SourceDocument, TaggedRow,
};
use crate::service::SessionState;
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 统一响应体
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            code: None,
            data: Some(data),
        })
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            LedgerError::DuplicateKey { .. } => (StatusCode::CONFLICT, "already_added"),
            LedgerError::AlreadySubmitted => (StatusCode::CONFLICT, "already_submitted"),
            LedgerError::EmptyLedgerSubmission => {
                (StatusCode::UNPROCESSABLE_ENTITY, "nothing_to_allocate")
            }
            LedgerError::InvalidLine { .. } | LedgerError::InvalidAmount(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_input")
            }
            LedgerError::UnknownDocument(_) | LedgerError::NoDocumentSelected(_) => {
                (StatusCode::BAD_REQUEST, "document_not_selected")
            }
            LedgerError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            LedgerError::LookupFailure(_) => (StatusCode::BAD_GATEWAY, "lookup_failed"),
            LedgerError::Persistence(_) => (StatusCode::BAD_GATEWAY, "persistence_failed"),
        };
        let body = ApiResponse::<()> {
            success: false,
            message: format!("Error: {}", self),
            code: Some(code),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

/// 搜索参数
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub page: Option<u32>,
    pub page_size: Option<PageSize>,
    /// 对照单号 (报价单 / 价目表)，用于同时带出对照价格
    pub counterpart: Option<String>,
}

/// 候选行 + 对照价格 + 是否已添加
#[derive(Debug, Serialize)]
pub struct CandidateView {
    #[serde(flatten)]
    pub candidate: CandidateLineItem,
    pub counterpart_price: Option<CounterpartPrice>,
    pub already_added: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: u64,
    pub state: SessionState,
    pub primary_document: Option<SourceDocument>,
    pub supplemental_document: Option<SourceDocument>,
    pub rows: Vec<TaggedRow>,
    pub summary: AggregateSummary,
    pub primary_subtotal: BucketSubtotal,
    pub supplemental_subtotal: BucketSubtotal,
}

/// 添加行请求
#[derive(Debug, Deserialize)]
pub struct AddRowRequest {
    pub bucket: Bucket,
    pub candidate: CandidateLineItem,
    pub counterpart_reference: Option<String>,
    /// 手工录入的售价，优先于对照单号
    pub unit_sale_price: Option<BigDecimal>,
}

#[derive(Debug, Serialize)]
pub struct RowChanged {
    pub row: Option<AllocationRow>,
    pub summary: AggregateSummary,
}

#[derive(Debug, Deserialize)]
pub struct AdditionalCostRequest {
    pub amount: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub date: NaiveDate,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub allocation_id: i64,
    pub submission: AllocationSubmission,
}

fn page_size_of(state: &AppState, params: &SearchParams) -> PageSize {
    params.page_size.unwrap_or(state.default_page_size)
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 搜索来源单据
pub async fn search_documents(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> LedgerResult<Json<ApiResponse<Page<SourceDocument>>>> {
    let page = state
        .resolver
        .search_documents(&params.q, params.page.unwrap_or(1), page_size_of(&state, &params))
        .await?;
    Ok(ApiResponse::ok(format!("{} documents found", page.total), page))
}

/// 新建编辑会话
pub async fn create_session(State(state): State<AppState>) -> Json<ApiResponse<SessionCreated>> {
    let session_id = state.sessions.create();
    ApiResponse::ok("Session created", SessionCreated { session_id })
}

fn session_view(state: &AppState, session_id: u64) -> LedgerResult<SessionView> {
    state.sessions.with_session(session_id, |s| {
        let ledger = s.ledger();
        SessionView {
            session_id,
            state: s.state(),
            primary_document: s.selected_document(Bucket::Primary).cloned(),
            supplemental_document: s.selected_document(Bucket::Supplemental).cloned(),
            rows: ledger.tagged_rows(),
            summary: ledger.summary().clone(),
            primary_subtotal: ledger.bucket_subtotal(Bucket::Primary),
            supplemental_subtotal: ledger.bucket_subtotal(Bucket::Supplemental),
        }
    })
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<u64>,
) -> LedgerResult<Json<ApiResponse<SessionView>>> {
    let view = session_view(&state, session_id)?;
    Ok(ApiResponse::ok(format!("{} rows", view.rows.len()), view))
}

/// 选择来源单据
pub async fn select_document(
    State(state): State<AppState>,
    Path((session_id, bucket)): Path<(u64, Bucket)>,
    Json(document): Json<SourceDocument>,
) -> LedgerResult<Json<ApiResponse<SessionView>>> {
    state
        .sessions
        .with_session_mut(session_id, |s| s.select_document(bucket, document))?;
    let view = session_view(&state, session_id)?;
    Ok(ApiResponse::ok(format!("{} document selected", bucket), view))
}

/// 搜索候选物料 - 被后续搜索取代的响应直接丢弃 (204)
pub async fn search_candidates(
    State(state): State<AppState>,
    Path((session_id, bucket)): Path<(u64, Bucket)>,
    Query(params): Query<SearchParams>,
) -> LedgerResult<Response> {
    let (document_id, gate) = state.sessions.with_session(session_id, |s| {
        s.require_document(bucket).map(|d| (d.id, s.search_gate(bucket)))
    })??;

    let page = state
        .resolver
        .search_latest(
            &gate,
            document_id,
            &params.q,
            params.page.unwrap_or(1),
            page_size_of(&state, &params),
        )
        .await?;
    let Some(page) = page else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let prices = match params.counterpart.as_deref() {
        Some(reference) => state.resolver.resolve_page_prices(&page.items, reference).await?,
        None => vec![None; page.items.len()],
    };

    let added: Vec<bool> = state.sessions.with_session(session_id, |s| {
        page.items
            .iter()
            .map(|item| s.ledger().contains(item.source_document_id, &item.item_code, bucket))
            .collect()
    })?;

    let Page {
        items,
        current_page,
        last_page,
        total,
        page_size,
    } = page;
    let views = items
        .into_iter()
        .zip(prices)
        .zip(added)
        .map(|((candidate, counterpart_price), already_added)| CandidateView {
            candidate,
            counterpart_price,
            already_added,
        })
        .collect();

    let page = Page {
        items: views,
        current_page,
        last_page,
        total,
        page_size,
    };
    Ok(ApiResponse::ok(format!("{} candidates found", total), page).into_response())
}

/// 添加分摊行
pub async fn add_row(
    State(state): State<AppState>,
    Path(session_id): Path<u64>,
    Json(req): Json<AddRowRequest>,
) -> LedgerResult<Json<ApiResponse<RowChanged>>> {
    let counterpart = match (req.unit_sale_price, req.counterpart_reference.as_deref()) {
        (Some(unit_price), reference) => Some(CounterpartPrice {
            item_code: req.candidate.item_code.clone(),
            reference: reference.unwrap_or("manual").to_string(),
            unit_price,
        }),
        (None, Some(reference)) => {
            state
                .resolver
                .resolve_counterpart_price(&req.candidate.item_code, reference)
                .await?
        }
        (None, None) => None,
    };

    let changed = state.sessions.with_session_mut(session_id, |s| {
        let row = s.add_row(req.bucket, &req.candidate, counterpart.as_ref())?;
        Ok(RowChanged {
            row: Some(row),
            summary: s.ledger().summary().clone(),
        })
    })?;
    Ok(ApiResponse::ok("Row added", changed))
}

/// 删除分摊行 (幂等)
pub async fn remove_row(
    State(state): State<AppState>,
    Path((session_id, bucket, document_id, item_code)): Path<(u64, Bucket, i64, String)>,
) -> LedgerResult<Json<ApiResponse<RowChanged>>> {
    let (removed, summary) = state.sessions.with_session_mut(session_id, |s| {
        let removed = s.remove_row(bucket, document_id, &item_code)?;
        Ok((removed, s.ledger().summary().clone()))
    })?;
    let message = if removed { "Row removed" } else { "Row not present" };
    Ok(ApiResponse::ok(message, RowChanged { row: None, summary }))
}

/// 录入运费等固定费用
pub async fn set_additional_cost(
    State(state): State<AppState>,
    Path(session_id): Path<u64>,
    Json(req): Json<AdditionalCostRequest>,
) -> LedgerResult<Json<ApiResponse<AggregateSummary>>> {
    let summary = state.sessions.with_session_mut(session_id, |s| {
        s.set_additional_cost(req.amount)?;
        Ok(s.ledger().summary().clone())
    })?;
    Ok(ApiResponse::ok("Additional cost updated", summary))
}

/// 导出当前分摊行 CSV
pub async fn export_csv(
    State(state): State<AppState>,
    Path(session_id): Path<u64>,
) -> LedgerResult<Response> {
    let rows = state
        .sessions
        .with_session(session_id, |s| s.ledger().tagged_rows())?;
    let mut buf = Vec::new();
    if let Err(e) = write_csv(&rows, &mut buf) {
        tracing::error!("CSV export for session {} failed: {}", session_id, e);
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response());
    }
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], buf).into_response())
}

/// 提交分摊单
pub async fn submit(
    State(state): State<AppState>,
    Path(session_id): Path<u64>,
    Json(req): Json<SubmitRequest>,
) -> LedgerResult<Json<ApiResponse<SubmitResponse>>> {
    let (allocation_id, submission) = state
        .sessions
        .submit(session_id, state.store.as_ref(), req.date, req.note)
        .await?;
    Ok(ApiResponse::ok(
        format!(
            "Allocation {} saved with {} rows",
            allocation_id,
            submission.rows.len()
        ),
        SubmitResponse {
            allocation_id,
            submission,
        },
    ))
}
