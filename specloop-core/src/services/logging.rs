//! Logging service

use crate::models::Verbosity;

/// Initialize logging with the specified verbosity
pub fn init_logging(level: Verbosity) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match level {
        Verbosity::Error => "specloop=error",
        Verbosity::Warn => "specloop=warn",
        Verbosity::Info => "specloop=info",
        Verbosity::Debug => "specloop=debug",
        Verbosity::Trace => "specloop=trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()?;

    Ok(())
}

/// Log a workflow lifecycle event
pub fn log_workflow_event(event_type: &str, session: &str, workflow: &str, details: Option<&str>) {
    tracing::info!(
        event_type = event_type,
        session = session,
        workflow = workflow,
        details = details.unwrap_or(""),
        "Workflow event"
    );
}

/// Log a system error
pub fn log_error(error: &str, context: Option<&str>) {
    tracing::error!(
        error = error,
        context = context.unwrap_or(""),
        "System error occurred"
    );
}
