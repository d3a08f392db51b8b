//! Lifecycle Hooks
//!
//! One optional callable per lifecycle event. Unset slots are no-ops. The
//! bundle is fixed once the server starts; hooks reach the host only through
//! the [`SkillContext`] they are handed.

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;

use crate::context::SkillContext;
use crate::setup::{SetupResult, SetupStep};

/// Future returned by every hook
pub type HookFuture<T> = BoxFuture<'static, anyhow::Result<T>>;

/// Hook taking only a context (load, unload, tick, memory flush, setup cancel)
pub type ContextHook = Box<dyn Fn(SkillContext) -> HookFuture<()> + Send + Sync>;
/// Hook receiving the session id
pub type SessionHook = Box<dyn Fn(SkillContext, String) -> HookFuture<()> + Send + Sync>;
/// Hook that may replace a message; `None` means no change
pub type TransformHook = Box<dyn Fn(SkillContext, String) -> HookFuture<Option<String>> + Send + Sync>;
pub type SetupStartHook = Box<dyn Fn(SkillContext) -> HookFuture<SetupStep> + Send + Sync>;
pub type SetupSubmitHook =
    Box<dyn Fn(SkillContext, String, Map<String, Value>) -> HookFuture<SetupResult> + Send + Sync>;

/// Lifecycle event names, as used in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Load,
    Unload,
    SessionStart,
    SessionEnd,
    BeforeMessage,
    AfterResponse,
    MemoryFlush,
    Tick,
    SetupStart,
    SetupSubmit,
    SetupCancel,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Unload => "unload",
            Self::SessionStart => "session-start",
            Self::SessionEnd => "session-end",
            Self::BeforeMessage => "before-message",
            Self::AfterResponse => "after-response",
            Self::MemoryFlush => "memory-flush",
            Self::Tick => "tick",
            Self::SetupStart => "setup-start",
            Self::SetupSubmit => "setup-submit",
            Self::SetupCancel => "setup-cancel",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook slots for a skill
#[derive(Default)]
pub struct LifecycleHooks {
    pub on_load: Option<ContextHook>,
    pub on_unload: Option<ContextHook>,
    pub on_session_start: Option<SessionHook>,
    pub on_session_end: Option<SessionHook>,
    pub on_before_message: Option<TransformHook>,
    pub on_after_response: Option<TransformHook>,
    pub on_memory_flush: Option<ContextHook>,
    pub on_tick: Option<ContextHook>,
    pub on_setup_start: Option<SetupStartHook>,
    pub on_setup_submit: Option<SetupSubmitHook>,
    pub on_setup_cancel: Option<ContextHook>,
}

fn context_hook<F, Fut>(f: F) -> ContextHook
where
    F: Fn(SkillContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move |ctx| Box::pin(f(ctx)))
}

fn session_hook<F, Fut>(f: F) -> SessionHook
where
    F: Fn(SkillContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move |ctx, session_id| Box::pin(f(ctx, session_id)))
}

fn transform_hook<F, Fut>(f: F) -> TransformHook
where
    F: Fn(SkillContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
{
    Box::new(move |ctx, text| Box::pin(f(ctx, text)))
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_load<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_load = Some(context_hook(f));
        self
    }

    pub fn on_unload<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_unload = Some(context_hook(f));
        self
    }

    pub fn on_session_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_session_start = Some(session_hook(f));
        self
    }

    pub fn on_session_end<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_session_end = Some(session_hook(f));
        self
    }

    pub fn on_before_message<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
    {
        self.on_before_message = Some(transform_hook(f));
        self
    }

    pub fn on_after_response<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
    {
        self.on_after_response = Some(transform_hook(f));
        self
    }

    pub fn on_memory_flush<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_memory_flush = Some(context_hook(f));
        self
    }

    pub fn on_tick<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_tick = Some(context_hook(f));
        self
    }

    pub fn on_setup_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<SetupStep>> + Send + 'static,
    {
        self.on_setup_start = Some(Box::new(move |ctx| Box::pin(f(ctx))));
        self
    }

    pub fn on_setup_submit<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext, String, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<SetupResult>> + Send + 'static,
    {
        self.on_setup_submit = Some(Box::new(move |ctx, step_id, values| {
            Box::pin(f(ctx, step_id, values))
        }));
        self
    }

    pub fn on_setup_cancel<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SkillContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_setup_cancel = Some(context_hook(f));
        self
    }

    /// Events that have a hook installed
    pub fn installed(&self) -> Vec<LifecycleEvent> {
        let slots = [
            (LifecycleEvent::Load, self.on_load.is_some()),
            (LifecycleEvent::Unload, self.on_unload.is_some()),
            (LifecycleEvent::SessionStart, self.on_session_start.is_some()),
            (LifecycleEvent::SessionEnd, self.on_session_end.is_some()),
            (LifecycleEvent::BeforeMessage, self.on_before_message.is_some()),
            (LifecycleEvent::AfterResponse, self.on_after_response.is_some()),
            (LifecycleEvent::MemoryFlush, self.on_memory_flush.is_some()),
            (LifecycleEvent::Tick, self.on_tick.is_some()),
            (LifecycleEvent::SetupStart, self.on_setup_start.is_some()),
            (LifecycleEvent::SetupSubmit, self.on_setup_submit.is_some()),
            (LifecycleEvent::SetupCancel, self.on_setup_cancel.is_some()),
        ];
        slots
            .into_iter()
            .filter_map(|(event, set)| set.then_some(event))
            .collect()
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("installed", &self.installed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_hooks() {
        assert!(LifecycleHooks::default().installed().is_empty());
    }

    #[test]
    fn test_builder_installs_slots() {
        let hooks = LifecycleHooks::new()
            .on_load(|_ctx| async { Ok(()) })
            .on_before_message(|_ctx, msg| async move { Ok(Some(msg.to_uppercase())) })
            .on_tick(|_ctx| async { Ok(()) });

        assert_eq!(
            hooks.installed(),
            vec![
                LifecycleEvent::Load,
                LifecycleEvent::BeforeMessage,
                LifecycleEvent::Tick
            ]
        );
    }

    #[test]
    fn test_event_names() {
        assert_eq!(LifecycleEvent::SessionStart.to_string(), "session-start");
        assert_eq!(LifecycleEvent::SetupSubmit.as_str(), "setup-submit");
    }
}
