pub mod chrome;
pub mod page;

pub use chrome::{ChromeDriver, ChromeFormPage, ChromeHostPage, ChromeSession, ConnectionMode};
pub use page::{FormPage, HostPage};
