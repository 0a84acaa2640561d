//! Single-threaded cooperative scheduler and inverter harvest state machine.
//!
//! This crate has no knowledge of Modbus wire formats, HTTP routing, or TLS;
//! those live behind the [`device`], [`secure_element`], and [`http_client`]
//! traits so the binary crate can supply concrete adapters while everything
//! in here stays testable with fakes.

pub mod blackboard;
pub mod bootstrap;
pub mod clock;
pub mod command_write;
pub mod device;
pub mod harvest;
pub mod http_client;
pub mod open_device;
pub mod scheduler;
pub mod secure_element;
pub mod settings_tasks;
pub mod task;
pub mod transport;
pub mod web_dispatch;
pub mod wifi_scanner;

pub use blackboard::{Blackboard, Listener, RegistryEvent, SchedulerClosed, SubmissionPort};
pub use bootstrap::{format_bootstrap_line, parse_bootstrap_file, BootstrapEntry};
pub use clock::Clock;
pub use command_write::CommandWriteTask;
pub use device::DeviceSession;
pub use harvest::HarvestTask;
pub use http_client::{HttpClient, HttpReply};
pub use open_device::OpenDeviceTask;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use secure_element::SecureElement;
pub use settings_tasks::{PullSettingsTask, PushSettingsTask};
pub use task::{FollowUp, Task};
pub use transport::HarvestTransport;
pub use web_dispatch::WebDispatchTask;
pub use wifi_scanner::{WifiNetwork, WifiScanner};
