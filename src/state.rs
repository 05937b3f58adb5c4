use crate::application::ports::qr_encoder::QrImageEncoder;
use crate::application::ports::remote_backend::RemoteBackend;
use crate::application::ports::text_generator::{GenerationOptions, TextGenerator};
use crate::application::services::{
    MaintenanceService, ProductService, QrCodeService, ScanTrackingService, SopService,
    StorefrontService, SyncService,
};
use crate::infrastructure::connectivity::ConnectivityMonitor;
use crate::infrastructure::database::legacy_migration;
use crate::infrastructure::database::schema::{storefront_schema, PRODUCTS, SOPS};
use crate::infrastructure::database::{ConnectionPool, LocalStore};
use crate::infrastructure::offline::{EntityCache, MutationQueue};
use crate::infrastructure::remote::{GeminiTextGenerator, HttpRemoteBackend};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// アプリケーション全体の状態。ストアもサービスも明示的に組み立てて
/// 注入する。モジュールレベルの遅延初期化シングルトンは持たない。
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LocalStore>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub products: Arc<ProductService>,
    pub storefront: Arc<StorefrontService>,
    pub scans: Arc<ScanTrackingService>,
    pub sops: Arc<SopService>,
    pub qr_codes: Arc<QrCodeService>,
    pub sync: Arc<SyncService>,
    pub maintenance: Arc<MaintenanceService>,
}

impl AppState {
    pub async fn new(
        config: AppConfig,
        pool: SqlitePool,
        backend: Arc<dyn RemoteBackend>,
        generator: Arc<dyn TextGenerator>,
        qr_encoder: Option<Arc<dyn QrImageEncoder>>,
    ) -> Result<Self, AppError> {
        let store = Arc::new(LocalStore::open(pool, storefront_schema()).await?);

        // レガシーストアの取り込みは明示的な初期化ステップ。失敗しても
        // 起動は止めない。
        if let Some(path) = &config.storage.legacy_store_path {
            if let Err(e) = legacy_migration::import_if_needed(&store, Path::new(path)).await {
                warn!(error = %e, "legacy store import failed");
            }
        }

        let monitor = Arc::new(ConnectivityMonitor::default());
        let queue = Arc::new(MutationQueue::new(store.clone()));
        let product_cache = Arc::new(EntityCache::new(store.clone(), PRODUCTS, "id"));
        let sop_cache = Arc::new(EntityCache::new(store.clone(), SOPS, "id"));

        let products = Arc::new(ProductService::new(
            backend.clone(),
            product_cache.clone(),
            store.clone(),
        ));
        let storefront = Arc::new(StorefrontService::new(
            store.clone(),
            queue.clone(),
            backend.clone(),
            monitor.clone(),
        ));
        let scans = Arc::new(ScanTrackingService::new(
            backend.clone(),
            queue.clone(),
            monitor.clone(),
            &config.scans,
        ));
        let generation_options = GenerationOptions {
            temperature: config.ai.temperature,
            max_tokens: config.ai.max_tokens,
            top_p: config.ai.top_p,
        };
        let sops = Arc::new(SopService::new(
            generator,
            backend.clone(),
            sop_cache.clone(),
            generation_options,
        ));
        let qr_codes = Arc::new(QrCodeService::new(backend.clone(), qr_encoder));
        let sync = Arc::new(SyncService::new(queue.clone(), backend, monitor.clone()));
        let maintenance = Arc::new(MaintenanceService::new(
            store.clone(),
            queue,
            product_cache,
            sop_cache,
            &config.storage,
        ));

        if config.sync.auto_sync {
            // 再接続のたびにキューをドレインする
            sync.spawn_reconnect_listener();
        }

        Ok(Self {
            store,
            monitor,
            products,
            storefront,
            scans,
            sops,
            qr_codes,
            sync,
            maintenance,
        })
    }

    /// Convenience constructor wiring the default HTTP adapters.
    pub async fn initialize(config: AppConfig) -> Result<Self, AppError> {
        std::fs::create_dir_all(&config.storage.data_dir)?;
        let pool =
            ConnectionPool::new(&config.database.url, config.database.max_connections).await?;
        let backend = Arc::new(
            HttpRemoteBackend::new(
                &config.remote.base_url,
                config.remote.api_key.clone(),
                Duration::from_secs(config.remote.request_timeout),
            )
            .map_err(|e| AppError::ConfigurationError(e.to_string()))?,
        );
        let generator = Arc::new(GeminiTextGenerator::from_config(&config.ai)?);
        Self::new(config, pool.pool().clone(), backend, generator, None).await
    }
}
