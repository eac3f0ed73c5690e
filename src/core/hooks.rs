//! Lifecycle callbacks invoked around each upload.
//!
//! Every callback is optional. A missing callback is a no-op and a failing one
//! is logged; neither affects the upload.

use std::sync::Arc;

use super::types::Vod;

pub type VodHook = Arc<dyn Fn(&Vod) -> anyhow::Result<()> + Send + Sync>;
pub type ProgressHook = Arc<dyn Fn(i64) -> anyhow::Result<()> + Send + Sync>;
pub type VodResultHook = Arc<dyn Fn(&Vod, bool) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Hooks {
    on_receive: Option<VodHook>,
    on_progress: Option<ProgressHook>,
    on_insert: Option<VodResultHook>,
    on_finish: Option<VodResultHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_receive<F>(mut self, f: F) -> Self
    where
        F: Fn(&Vod) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_receive = Some(Arc::new(f));
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(i64) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_insert<F>(mut self, f: F) -> Self
    where
        F: Fn(&Vod, bool) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_insert = Some(Arc::new(f));
        self
    }

    pub fn on_finish<F>(mut self, f: F) -> Self
    where
        F: Fn(&Vod, bool) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_finish = Some(Arc::new(f));
        self
    }

    pub fn receive(&self, vod: &Vod) {
        if let Some(hook) = &self.on_receive {
            if let Err(err) = hook(vod) {
                tracing::debug!(hook = "OnReceive", error = %err, "hook failed");
            }
        }
    }

    pub fn progress(&self, percent: i64) {
        if let Some(hook) = &self.on_progress {
            if let Err(err) = hook(percent) {
                tracing::debug!(hook = "OnProgress", error = %err, "hook failed");
            }
        }
    }

    pub fn insert(&self, vod: &Vod, success: bool) {
        if let Some(hook) = &self.on_insert {
            if let Err(err) = hook(vod, success) {
                tracing::debug!(hook = "OnInsert", error = %err, "hook failed");
            }
        }
    }

    pub fn finish(&self, vod: &Vod, success: bool) {
        if let Some(hook) = &self.on_finish {
            if let Err(err) = hook(vod, success) {
                tracing::debug!(hook = "OnFinish", error = %err, "hook failed");
            }
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_receive", &self.on_receive.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_insert", &self.on_insert.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

/// Hooks that spawn an external command per event.
///
/// The command is run as `<command> <event> <json payload>` and not awaited.
pub fn command_hooks(command: impl Into<String>) -> Hooks {
    let command: Arc<str> = Arc::from(command.into());

    let receive = command.clone();
    let progress = command.clone();
    let insert = command.clone();
    let finish = command;

    Hooks::new()
        .on_receive(move |vod| spawn_hook(&receive, "OnReceive", serde_json::to_value(vod)?))
        .on_progress(move |percent| spawn_hook(&progress, "OnProgress", serde_json::json!(percent)))
        .on_insert(move |vod, success| {
            let payload = serde_json::json!({ "vod": vod, "success": success });
            spawn_hook(&insert, "OnInsert", payload)
        })
        .on_finish(move |vod, success| {
            let payload = serde_json::json!({ "vod": vod, "success": success });
            spawn_hook(&finish, "OnFinish", payload)
        })
}

fn spawn_hook(command: &str, event: &str, payload: serde_json::Value) -> anyhow::Result<()> {
    tokio::process::Command::new(command)
        .arg(event)
        .arg(payload.to_string())
        .spawn()
        .map_err(|err| anyhow::anyhow!("unable to run {command}: {err}"))?;
    Ok(())
}
