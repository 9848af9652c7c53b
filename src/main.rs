//! Voxdial - 外呼活动与实时语音对话编排引擎
//!
//! 引擎进程：装配适配器与调度器后常驻运行。
//! 控制面（活动提交、入站信令投递）由进程内嵌入方通过
//! DispatcherHandle / 入站通道驱动，REST 表面不在核心范围内。

use std::sync::Arc;

use tokio::sync::mpsc;

use voxdial::application::commands::handlers::RecoverOrphanSessionsHandler;
use voxdial::application::commands::RecoverOrphanSessionsCommand;
use voxdial::application::ports::RecordingSinkPort;
use voxdial::config::{load_config, print_config};
use voxdial::infrastructure::adapters::{
    build_llm, build_stt, build_telephony, build_tts, FileRecordingSink,
};
use voxdial::infrastructure::events::EventPublisher;
use voxdial::infrastructure::memory::InMemorySessionRegistry;
use voxdial::infrastructure::persistence::sled::{SledEventLedger, SledLedgerConfig};
use voxdial::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteAttemptRepository,
    SqliteCampaignRepository,
};
use voxdial::infrastructure::worker::{
    CampaignDispatcher, DispatcherConfig, InboundRouter, PipelineConfig, PipelineDeps,
    SessionOrchestrator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!("{},voxdial={}", config.log.level, config.log.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    tracing::info!("Voxdial - 外呼活动与实时语音对话编排引擎");
    print_config(&config);

    // 确保数据目录存在
    for path in [&config.database.path, &config.ledger.path] {
        if let Some(parent) = std::path::Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // 初始化数据库
    let db_config = DatabaseConfig {
        database_url: config.database.database_url(),
        max_connections: config.database.max_connections,
    };
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;

    // 创建 Repository 适配器
    let campaign_repo = Arc::new(SqliteCampaignRepository::new(pool.clone()));
    let attempt_repo = Arc::new(SqliteAttemptRepository::new(pool));

    // 创建 Sled 事件账本
    let ledger = SledEventLedger::new(&SledLedgerConfig {
        db_path: config.ledger.path.clone(),
    })
    .map_err(|e| anyhow::anyhow!("Failed to open ledger: {}", e))?
    .arc();

    // 孤儿会话回收：上次进程没走到终态的会话补记 orphaned
    let recovery = RecoverOrphanSessionsHandler::new(ledger.clone());
    let recovered = recovery.handle(RecoverOrphanSessionsCommand).await?;
    if !recovered.recovered.is_empty() {
        tracing::warn!(
            count = recovered.recovered.len(),
            "Recovered orphaned sessions from previous run"
        );
    }

    // 按配置装配电话网关与三个提供商
    let telephony = build_telephony(&config)?;
    let stt = build_stt(&config)?;
    let llm = build_llm(&config)?;
    let tts = build_tts(&config)?;

    // 录音外发（文件 sink）
    let recording: Option<Arc<dyn RecordingSinkPort>> = if config.recording.enabled {
        Some(Arc::new(FileRecordingSink::new(&config.recording.dir).await?))
    } else {
        None
    };

    // 会话登记与事件广播
    let registry = Arc::new(InMemorySessionRegistry::new());
    let events = EventPublisher::new().arc();

    // 会话编排器
    let deps = PipelineDeps {
        stt,
        llm,
        tts,
        ledger: ledger.clone(),
        recording,
    };
    let orchestrator = SessionOrchestrator::new(
        telephony.clone(),
        deps,
        registry.clone(),
        events.clone(),
        PipelineConfig::from_settings(&config.pipeline),
    )
    .arc();

    // 活动调度器
    let dispatcher = CampaignDispatcher::new(
        DispatcherConfig::from_settings(&config.dispatcher, config.telephony.caller_id.clone()),
        telephony.clone(),
        orchestrator.clone(),
        campaign_repo,
        attempt_repo,
        ledger,
        registry,
        events,
    );
    // 句柄保活：嵌入方经由它提交/暂停/恢复/取消活动
    let dispatcher_handle = dispatcher.handle();
    tokio::spawn(dispatcher.run());

    // 入站路由（信令面通过通道投递 InboundSignal）
    let inbound_tx = if config.inbound.enabled {
        let (tx, rx) = mpsc::channel(64);
        let router = InboundRouter::new(
            rx,
            telephony.clone(),
            orchestrator.clone(),
            config.inbound.agent.clone(),
        );
        tokio::spawn(router.run());
        Some(tx)
    } else {
        None
    };

    tracing::info!("Engine running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    // 关闭控制面：调度循环在在途会话排空后退出
    drop(dispatcher_handle);
    drop(inbound_tx);

    tracing::info!("Engine shutdown complete");
    Ok(())
}
