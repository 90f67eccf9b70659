use anyhow::Result;

/// Every state transition runs on one logical thread, so the tracker never needs more than a
/// current-thread runtime.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
