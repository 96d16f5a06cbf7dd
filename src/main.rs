use cost_margin_ledger::api::{self, AppState};
use cost_margin_ledger::models::PageSize;
use cost_margin_ledger::service::{AllocationStore, CounterpartPriceSource, MaterialSearch};
use cost_margin_ledger::{create_pool, AppConfig, CandidateResolver, InMemoryDirectory, PgDirectory, SessionRegistry};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Config load failed ({}), falling back to environment", e);
            AppConfig::from_env()
        }
    };
    info!("Starting server with config: {:?}", config);

    // 有数据库地址时使用 PostgreSQL，否则使用内存实现
    let (search, prices, store): (
        Arc<dyn MaterialSearch>,
        Arc<dyn CounterpartPriceSource>,
        Arc<dyn AllocationStore>,
    ) = match config.database.url.as_deref() {
        Some(url) => {
            let pool = create_pool(url, &config.database).await?;
            info!("Database pool created");
            let directory = Arc::new(PgDirectory::new(pool));
            (directory.clone(), directory.clone(), directory)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory directory");
            let directory = Arc::new(InMemoryDirectory::new());
            (directory.clone(), directory.clone(), directory)
        }
    };

    let default_page_size = PageSize::limited(config.search.default_page_size).unwrap_or(PageSize::All);
    let state = AppState {
        sessions: Arc::new(SessionRegistry::new()),
        resolver: Arc::new(CandidateResolver::new(search, prices, config.search.max_page_size)),
        store,
        default_page_size,
    };

    let app = api::router(state);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  GET    /api/documents                        - 搜索来源单据");
    info!("  POST   /api/sessions                         - 新建分摊会话");
    info!("  GET    /api/sessions/:id/candidates/:bucket  - 搜索候选物料");
    info!("  POST   /api/sessions/:id/rows                - 添加分摊行");
    info!("  POST   /api/sessions/:id/submit              - 提交分摊单");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
