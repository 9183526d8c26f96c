use tokio::sync::Mutex as AsyncMutex;

/// Serialises tests that set or remove `AUI_*` environment variables.
/// Sync tests take it with `.blocking_lock()`, async tests with `.lock().await`.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());
