use invoice_flow::service::{LogNotificationSink, NotificationSink};
use invoice_flow::{api, create_pool, AppConfig, Backends, MemoryStore, Outbox, PgStore, WorkflowEngine};
use std::sync::Arc;
use tracing::info;
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
    let config = AppConfig::load()?;
    info!("Starting server with config: {:?}", config);

    // 存储: 配置了数据库时用 PostgreSQL, 否则用内存存储
    let backends = match &config.database.url {
        Some(url) => {
            let pool = create_pool(url, &config.database).await?;
            info!("Database pool created");
            let store = Arc::new(PgStore::new(pool));
            store.ensure_schema().await?;
            Backends::shared(store)
        }
        None => {
            info!("No database configured, using in-memory store");
            Backends::shared(Arc::new(MemoryStore::new()))
        }
    };

    // 通知发件箱
    let sink: Arc<dyn NotificationSink> = Arc::new(LogNotificationSink);
    let (outbox, _dispatcher) = Outbox::spawn(sink);

    let engine = Arc::new(WorkflowEngine::new(backends, outbox, &config)?);
    let app = api::router(engine);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/invoices                - submit an invoice");
    info!("  POST /api/invoices/:id/actions    - apply a workflow action");
    info!("  POST /api/match/batch             - preview three-way matches");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
