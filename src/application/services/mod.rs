pub mod maintenance_service;
pub mod product_service;
pub mod qr_service;
pub mod scan_service;
pub mod sop_service;
pub mod storefront_service;
pub mod sync_service;

pub use maintenance_service::{CacheSizeReport, MaintenanceReport, MaintenanceService};
pub use product_service::ProductService;
pub use qr_service::QrCodeService;
pub use scan_service::{ScanOutcome, ScanTrackingService};
pub use sop_service::SopService;
pub use storefront_service::StorefrontService;
pub use sync_service::{SyncService, SyncStatus, SyncSummary};
