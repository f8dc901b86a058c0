pub mod destination;
pub mod format;
pub mod level;
pub mod sink;
pub mod tracing_sink;

pub use destination::{ConsoleDestination, Destination, FileDestination};
pub use format::Formatter;
pub use level::Level;
pub use sink::{ActiveSink, InertSink, Sink, configure_sink};
pub use tracing_sink::TracingSink;
