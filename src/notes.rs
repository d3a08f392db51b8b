//! Notes Skill
//!
//! The skill the binary serves. Notes are stored as one JSON file each in
//! the data directory and indexed in host state under `note:<id>` keys, so
//! adding a note never needs to read the index first.
//!
//! Hooks keep a per-session message counter, inject the saved profile into
//! the first message of a session, emit a periodic summary event from the
//! tick, and walk the user through a one-step profile wizard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::client::EntitySearch;
use crate::context::SkillContext;
use crate::lifecycle::LifecycleHooks;
use crate::setup::{SetupField, SetupFieldType, SetupResult, SetupStep};
use crate::skill::SkillDefinition;
use crate::tools::{arg_str, ParameterSpec, ToolDefinition, ToolHandler, ToolResult};

const NOTE_KEY_PREFIX: &str = "note:";
const CONFIG_FILE: &str = "config.json";
const SUMMARY_EVERY_TICKS: u64 = 10;
const FOOTER_EVERY_MESSAGES: u64 = 5;
const EXPERIENCE_LEVELS: [&str; 3] = ["beginner", "intermediate", "advanced"];

/// A stored note
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Saved by the setup wizard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub experience: String,
}

/// Build the notes skill
pub fn notes_skill() -> SkillDefinition {
    let hooks = LifecycleHooks::new()
        .on_load(on_load)
        .on_session_start(on_session_start)
        .on_before_message(on_before_message)
        .on_after_response(on_after_response)
        .on_memory_flush(on_memory_flush)
        .on_tick(on_tick)
        .on_setup_start(on_setup_start)
        .on_setup_submit(on_setup_submit)
        .on_setup_cancel(on_setup_cancel);

    SkillDefinition::new("notes", "Save, list and look up personal notes")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_tool(ToolHandler::new(
            ToolDefinition::new("add_note", "Save a note to persistent storage")
                .with_parameter("title", ParameterSpec::string("Note title", true))
                .with_parameter("body", ParameterSpec::string("Note content", true)),
            add_note,
        ))
        .with_tool(ToolHandler::new(
            ToolDefinition::new("get_note", "Retrieve a saved note by id")
                .with_parameter("note_id", ParameterSpec::string("Note id returned by add_note", true)),
            get_note,
        ))
        .with_tool(ToolHandler::new(
            ToolDefinition::new("list_notes", "List all saved notes"),
            list_notes,
        ))
        .with_tool(ToolHandler::new(
            ToolDefinition::new("find_entities", "Search the host's entity store")
                .with_parameter("query", ParameterSpec::string("Search text", true))
                .with_parameter(
                    "limit",
                    ParameterSpec::integer("Maximum number of results", false).with_default(json!(10)),
                ),
            find_entities,
        ))
        .with_tick_interval(Duration::from_secs(60))
        .with_setup()
        .with_hooks(hooks)
}

fn note_stats_tool() -> ToolHandler {
    ToolHandler::new(
        ToolDefinition::new("note_stats", "Summarize saved notes (advanced users)"),
        note_stats,
    )
}

/// Tools that only advanced users get
fn register_profile_tools(ctx: &SkillContext, profile: &Profile) {
    if profile.experience == "advanced" {
        ctx.tools().register(note_stats_tool());
    }
}

fn note_titles(state: &Value) -> Vec<(String, String)> {
    let Some(state) = state.as_object() else {
        return Vec::new();
    };
    let mut notes: Vec<(String, String)> = state
        .iter()
        .filter_map(|(key, title)| {
            let id = key.strip_prefix(NOTE_KEY_PREFIX)?;
            Some((id.to_string(), title.as_str().unwrap_or_default().to_string()))
        })
        .collect();
    notes.sort();
    notes
}

fn profile_from_state(state: &Value) -> Option<Profile> {
    serde_json::from_value(state.get("config")?.clone()).ok()
}

async fn add_note(ctx: SkillContext, args: Map<String, Value>) -> anyhow::Result<ToolResult> {
    let title = arg_str(&args, "title").unwrap_or("Untitled").to_string();
    let body = arg_str(&args, "body").unwrap_or_default().to_string();

    let note = Note {
        id: format!("note_{}", Uuid::new_v4().simple()),
        title,
        body,
        created_at: Utc::now(),
    };

    ctx.write_data(&format!("{}.json", note.id), &serde_json::to_string_pretty(&note)?)
        .await?;
    let index_key = format!("{}{}", NOTE_KEY_PREFIX, note.id);
    ctx.set_state(json!({ index_key: note.title })).await?;

    Ok(ToolResult::text(format!("Note '{}' saved as {}.", note.title, note.id)))
}

async fn get_note(ctx: SkillContext, args: Map<String, Value>) -> anyhow::Result<ToolResult> {
    let Some(note_id) = arg_str(&args, "note_id") else {
        return Ok(ToolResult::error("Missing required argument: note_id"));
    };

    let raw = match ctx.read_data(&format!("{}.json", note_id)).await {
        Ok(raw) => raw,
        Err(e) => return Ok(ToolResult::error(format!("Note not found: {}", e))),
    };
    let note: Note = match serde_json::from_str(&raw) {
        Ok(note) => note,
        Err(e) => return Ok(ToolResult::error(format!("Note {} is corrupt: {}", note_id, e))),
    };

    Ok(ToolResult::text(format!(
        "**{}**\n\n{}\n\n_Created: {}_",
        note.title,
        note.body,
        note.created_at.to_rfc3339()
    )))
}

async fn list_notes(ctx: SkillContext, _args: Map<String, Value>) -> anyhow::Result<ToolResult> {
    let state = ctx.get_state().await?;
    let notes = note_titles(&state);

    if notes.is_empty() {
        return Ok(ToolResult::text("No notes saved yet."));
    }

    let lines: Vec<String> = notes
        .iter()
        .map(|(id, title)| format!("- **{}**: {}", id, title))
        .collect();
    Ok(ToolResult::text(format!("Notes ({}):\n{}", notes.len(), lines.join("\n"))))
}

async fn find_entities(ctx: SkillContext, args: Map<String, Value>) -> anyhow::Result<ToolResult> {
    let Some(query) = arg_str(&args, "query") else {
        return Ok(ToolResult::error("Missing required argument: query"));
    };
    let search = EntitySearch {
        limit: Some(args.get("limit").and_then(Value::as_u64).unwrap_or(10) as u32),
        ..EntitySearch::new(query)
    };

    let results = ctx.entities().search_with(&search).await?;
    if results.is_empty() {
        return Ok(ToolResult::text(format!("No entities match '{}'.", query)));
    }

    let lines: Vec<String> = results
        .iter()
        .map(|entity| {
            let title = entity
                .get("title")
                .or_else(|| entity.get("id"))
                .and_then(Value::as_str)
                .unwrap_or("untitled");
            let kind = entity.get("type").and_then(Value::as_str).unwrap_or("entity");
            format!("- **{}** ({})", title, kind)
        })
        .collect();
    Ok(ToolResult::text(format!(
        "Entities ({}):\n{}",
        results.len(),
        lines.join("\n")
    )))
}

async fn note_stats(ctx: SkillContext, _args: Map<String, Value>) -> anyhow::Result<ToolResult> {
    let state = ctx.get_state().await?;
    let notes = note_titles(&state);
    let ticks = state.get("tick_count").and_then(Value::as_u64).unwrap_or(0);
    Ok(ToolResult::text(format!(
        "{} notes saved, {} ticks observed",
        notes.len(),
        ticks
    )))
}

async fn on_load(ctx: SkillContext) -> anyhow::Result<()> {
    ctx.log(&format!("notes: loading from {}", ctx.data_dir()));

    let raw = match ctx.read_data(CONFIG_FILE).await {
        Ok(raw) => raw,
        Err(e) => {
            ctx.log(&format!("notes: no saved profile ({})", e));
            return Ok(());
        }
    };
    let profile: Profile = serde_json::from_str(&raw)?;
    ctx.set_state(json!({ "config": profile })).await?;
    register_profile_tools(&ctx, &profile);
    Ok(())
}

async fn on_session_start(ctx: SkillContext, session_id: String) -> anyhow::Result<()> {
    ctx.session().set("message_count", json!(0));
    ctx.log(&format!("notes: session {} started", session_id));
    Ok(())
}

async fn on_before_message(ctx: SkillContext, message: String) -> anyhow::Result<Option<String>> {
    let session = ctx.session();
    let count = session
        .get("message_count")
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
        + 1;
    session.set("message_count", json!(count));

    if count != 1 {
        return Ok(None);
    }
    let state = ctx.get_state().await?;
    Ok(profile_from_state(&state).map(|profile| {
        format!(
            "{}\n\n[Context from notes skill: user is '{}', experience: {}]",
            message, profile.username, profile.experience
        )
    }))
}

async fn on_after_response(ctx: SkillContext, response: String) -> anyhow::Result<Option<String>> {
    let count = ctx
        .session()
        .get("message_count")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    if count > 0 && count % FOOTER_EVERY_MESSAGES == 0 {
        return Ok(Some(format!(
            "{}\n\n---\n_Tip: use `list_notes` to see your saved notes._",
            response
        )));
    }
    Ok(None)
}

async fn on_memory_flush(ctx: SkillContext) -> anyhow::Result<()> {
    ctx.log("notes: memory flush, recording checkpoint");
    ctx.set_state(json!({ "last_flush": Utc::now().to_rfc3339() })).await?;
    Ok(())
}

async fn on_tick(ctx: SkillContext) -> anyhow::Result<()> {
    let state = ctx.get_state().await?;
    let tick_count = state.get("tick_count").and_then(Value::as_u64).unwrap_or(0) + 1;
    ctx.set_state(json!({ "tick_count": tick_count })).await?;

    if tick_count % SUMMARY_EVERY_TICKS == 0 {
        let notes_count = note_titles(&state).len();
        ctx.emit_event(
            "periodic_summary",
            json!({
                "tick_count": tick_count,
                "notes_count": notes_count,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        )
        .await?;
        ctx.log(&format!("notes: emitted periodic_summary (notes={})", notes_count));
    }
    Ok(())
}

fn profile_step() -> SetupStep {
    let experience = EXPERIENCE_LEVELS.iter().fold(
        SetupField::new("experience", SetupFieldType::Select, "Experience")
            .with_default(json!("beginner")),
        |field, level| field.with_option(level, level),
    );

    SetupStep::new("profile", "Your Profile")
        .with_description("Tell the notes skill who you are.")
        .with_field(
            SetupField::new("username", SetupFieldType::Text, "Name").with_placeholder("e.g. Sam"),
        )
        .with_field(experience)
}

async fn on_setup_start(_ctx: SkillContext) -> anyhow::Result<SetupStep> {
    Ok(profile_step())
}

async fn on_setup_submit(
    ctx: SkillContext,
    step_id: String,
    values: Map<String, Value>,
) -> anyhow::Result<SetupResult> {
    if step_id != "profile" {
        anyhow::bail!("Unknown setup step: {}", step_id);
    }

    let username = arg_str(&values, "username").unwrap_or_default().trim().to_string();
    if username.is_empty() {
        return Ok(SetupResult::field_error("username", "Name is required"));
    }
    let experience = arg_str(&values, "experience").unwrap_or("beginner").to_string();
    if !EXPERIENCE_LEVELS.contains(&experience.as_str()) {
        return Ok(SetupResult::field_error("experience", "Pick one of the listed levels"));
    }

    let profile = Profile {
        username,
        experience,
    };
    ctx.write_data(CONFIG_FILE, &serde_json::to_string_pretty(&profile)?)
        .await?;
    ctx.set_state(json!({ "config": profile })).await?;
    register_profile_tools(&ctx, &profile);

    Ok(SetupResult::complete(Some(format!(
        "Welcome, {}!",
        profile.username
    ))))
}

async fn on_setup_cancel(ctx: SkillContext) -> anyhow::Result<()> {
    ctx.log("notes: setup cancelled");
    Ok(())
}
