//! Demo session: a small todo store persisted to the data directory

use colored::Colorize;
use modux_core::{decode_payload, AppConfig, CommitOptions, Payload};
use modux_persist::PersistenceManager;
use modux_state::{Module, Store, WatchOptions};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::commands::{open_strategy, persistence_options};

/// Global `app` module: loading flag and theme
pub fn app_module() -> Module {
    Module::new("app")
        .with_state(json!({ "loading": false, "theme": "light" }))
        .mutation("setLoading", |state, payload| {
            state["loading"] = json!(payload.as_bool().unwrap_or(false));
            Ok(())
        })
        .mutation("setTheme", |state, payload| {
            let theme = payload
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("theme must be a string"))?;
            state["theme"] = json!(theme);
            Ok(())
        })
}

/// Namespaced `todos` module with derived counts and a batch action
pub fn todos_module() -> Module {
    Module::new("todos")
        .namespaced(true)
        .with_state_fn(|| json!({ "items": [], "nextId": 1 }))
        .mutation("add", |state, payload| {
            let title = payload
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("todo title must be a string"))?;
            let id = state["nextId"].as_u64().unwrap_or(1);
            if let Some(items) = state["items"].as_array_mut() {
                items.push(json!({ "id": id, "title": title, "done": false }));
            }
            state["nextId"] = json!(id + 1);
            Ok(())
        })
        .mutation("toggle", |state, payload| {
            let id = payload.as_u64();
            if let Some(items) = state["items"].as_array_mut() {
                for item in items.iter_mut().filter(|item| item["id"].as_u64() == id) {
                    let done = item["done"].as_bool().unwrap_or(false);
                    item["done"] = json!(!done);
                }
            }
            Ok(())
        })
        .getter("count", |ctx| {
            json!(ctx.state()["items"].as_array().map(Vec::len).unwrap_or(0))
        })
        .getter("remaining", |ctx| {
            let remaining = ctx.state()["items"]
                .as_array()
                .map(|items| items.iter().filter(|item| item["done"] != json!(true)).count())
                .unwrap_or(0);
            json!(remaining)
        })
        .action("addMany", |ctx, payload| async move {
            ctx.commit_with("setLoading", json!(true), CommitOptions::root())?;
            let titles: Vec<String> = decode_payload(&payload)?;
            for title in &titles {
                tokio::time::sleep(Duration::from_millis(5)).await;
                ctx.commit("add", json!(title))?;
            }
            ctx.commit_with("setLoading", json!(false), CommitOptions::root())?;
            Ok(ctx.getter("count").unwrap_or(Payload::Null))
        })
}

/// Build a store, restore it from disk, run a few commits and persist
pub async fn run_demo(config: &AppConfig) -> anyhow::Result<()> {
    let store = Store::new(config.store.clone());
    store.register_module(app_module())?;
    store.register_module(todos_module())?;

    let manager = Arc::new(PersistenceManager::new(
        store.clone(),
        open_strategy(config)?,
        persistence_options(config),
    )?);
    if manager.recover_unload()? {
        info!("Recovered state from an interrupted session");
    }
    let restored = manager.restore_all().await?;
    println!("{} {} modules restored", "modux demo".bold(), restored);

    let watch = store.subscribe_state(
        |root| root["todos"]["items"].clone(),
        |items, _| {
            let count = items.as_array().map(Vec::len).unwrap_or(0);
            println!("  {} {} todos", "watch".cyan(), count);
            Ok(())
        },
        WatchOptions::default(),
    );

    // write the fallback blob if interrupted mid-session
    let unload = Arc::clone(&manager);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, writing teardown state");
            if let Err(e) = unload.handle_unload() {
                warn!("Teardown write failed: {}", e);
            }
            std::process::exit(130);
        }
    });

    let count = store
        .dispatch("todos/addMany", json!(["write docs", "review patch", "ship"]))
        .await?;
    println!("  {} {}", "count".green(), count);

    store.commit("todos/toggle", json!(1))?;
    store.commit("setTheme", json!("dark"))?;
    println!(
        "  {} {}",
        "remaining".green(),
        store.getter("todos/remaining").unwrap_or(Payload::Null)
    );

    store.undo();
    println!(
        "  {} theme after undo: {}",
        "history".yellow(),
        store.get_state(Some("app.theme")).unwrap_or(Payload::Null)
    );
    store.redo();

    manager.flush().await?;
    watch.unsubscribe();
    signal.abort();

    println!("{}", serde_json::to_string_pretty(&store.root_state())?);
    Ok(())
}
