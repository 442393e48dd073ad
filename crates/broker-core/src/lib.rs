pub mod broker;
pub mod brokerage;
pub mod collection;
pub mod domain_monitor;
pub mod error;
pub mod prelude;
pub mod proxy;

pub use broker::{Broker, BrokerConfig};
pub use brokerage::{AcquireOutcome, Brokerage};
pub use collection::ProxyCollection;
pub use domain_monitor::{DomainMonitor, MonitorStats};
pub use error::{MonitorError, ProxyError};
pub use proxy::{Protocol, ProxyKey, ProxyRecord};
