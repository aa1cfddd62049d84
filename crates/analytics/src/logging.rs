use log::LevelFilter;

/// Initialize logging for the host process.
/// Should be called once at startup.
pub fn init_logging() {
    env_logger::builder().filter_level(LevelFilter::Info).init();
}
