use crate::qemu_trace;
use kernel_ports::PortIo;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct QemuLogger<P> {
    ports: P,
    max_level: LevelFilter,
}

impl<P: PortIo> QemuLogger<P> {
    #[must_use]
    pub const fn new(ports: P, max_level: LevelFilter) -> Self {
        Self { ports, max_level }
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Installs this logger as the global `log` sink. Call once during early init.
    ///
    /// # Errors
    /// Fails if another logger was installed first.
    pub fn init(&'static self) -> Result<(), SetLoggerError>
    where
        P: Send + Sync,
    {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl<P: PortIo + Send + Sync> Log for QemuLogger<P> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Format: "[LEVEL] target: message\n"
        qemu_trace!(
            &self.ports,
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        // no-op for qemu debug port
    }
}
