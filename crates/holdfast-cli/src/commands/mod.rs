pub mod config;
pub mod photos;
pub mod simulate;
pub mod task;

/// Build the single-threaded runtime async commands block on.
pub(crate) fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
