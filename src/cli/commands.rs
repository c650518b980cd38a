//! Command-line interface
//!
//! Defines the command tree with clap and drives the core components:
//! profile CRUD against the credential store, listing through the
//! reconstruction engine, uploads through the orchestrator, and the
//! session/config gateway calls.

use crate::config::{ConnectionProfile, ProfileStore, Settings};
use crate::error::{PrismError, Result};
use crate::gateway::GatewayClient;
use crate::listing::{build_view, ListingCache, ListingEngine, SortKey, SortOrder, ViewQuery};
use crate::store::{StoreManager, UploadEvent, UploadOrchestrator, UploadRequest, UploadState};
use crate::utils::format::{format_size, format_speed, mask_secret, OutputFormat, TableFormatter};
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "prism")]
#[command(about = "Management console for R2 and other S3-compatible object stores")]
#[command(version, author)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Disable colored table headers
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage store connection profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// List objects on the active connection (alias: list)
    #[command(alias = "list")]
    Ls {
        /// Only show entries under this directory
        #[arg(short, long)]
        dir: Option<String>,
        /// Only show entries whose name contains this term
        #[arg(short, long)]
        search: Option<String>,
        /// Sort key
        #[arg(long, value_enum, default_value = "date")]
        sort: SortKey,
        /// Sort order
        #[arg(long, value_enum, default_value = "desc")]
        order: SortOrder,
        /// Local display page (of already fetched entries)
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        /// Keep following the continuation cursor until the listing is
        /// complete
        #[arg(long)]
        all: bool,
    },
    /// Upload files to the active connection
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Destination directory within the bucket
        #[arg(short, long)]
        dir: Option<String>,
        /// Skip the WebP re-encoding of raster images
        #[arg(long)]
        no_webp: bool,
    },
    /// Delete objects by key (alias: rm)
    #[command(alias = "rm")]
    Delete {
        /// Keys to delete
        #[arg(required = true)]
        keys: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Print the public URL for a key
    Url {
        key: String,
    },
    /// Show bucket totals for the active connection
    Stats,
    /// Show the resolved configuration
    Config,
    /// Sync profiles with the remote config endpoint
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Open the gateway login flow in the browser
    Login,
    /// End the gateway session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Add or update a profile (prompts for anything omitted)
    Add {
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Store account id
        #[arg(long)]
        account_id: Option<String>,
        /// Access key id
        #[arg(long)]
        access_key_id: Option<String>,
        /// Bucket name
        #[arg(long)]
        bucket: Option<String>,
        /// Explicit endpoint override
        #[arg(long)]
        endpoint: Option<String>,
        /// Custom domain for public URLs
        #[arg(long)]
        custom_domain: Option<String>,
        /// Mark as the bootstrap default
        #[arg(long)]
        default: bool,
    },
    /// List stored profiles (alias: ls)
    #[command(alias = "ls")]
    List,
    /// Switch the active profile
    Use {
        /// Profile id or name
        profile: String,
    },
    /// Delete a profile (alias: rm)
    #[command(alias = "rm")]
    Remove {
        /// Profile id or name
        profile: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Show one profile (active profile when omitted)
    Show {
        /// Profile id or name
        profile: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Replace local profiles with the remote config endpoint's list
    Pull,
    /// Push local profiles to the remote config endpoint
    Push,
}

#[derive(Tabled, Serialize)]
struct ProfileRow {
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Bucket")]
    bucket: String,
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Access Key")]
    access_key: String,
}

#[derive(Tabled, Serialize)]
struct FileRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

impl Cli {
    pub async fn execute(self, settings: Settings) -> Result<()> {
        let formatter = TableFormatter::new(self.format, self.no_color);
        let profiles = ProfileStore::open_default()?;

        match self.command {
            Commands::Profile { command } => {
                profile_command(command, &profiles, &formatter).await
            }
            Commands::Ls { dir, search, sort, order, page, all } => {
                let query = ViewQuery {
                    directory: dir,
                    search,
                    sort_key: sort,
                    sort_order: order,
                    page,
                    page_size: settings.local_page_size,
                };
                list_command(&settings, &profiles, &formatter, query, all).await
            }
            Commands::Upload { files, dir, no_webp } => {
                upload_command(&settings, &profiles, files, dir, no_webp).await
            }
            Commands::Delete { keys, force } => {
                delete_command(&profiles, keys, force).await
            }
            Commands::Url { key } => {
                let manager = active_manager(&profiles).await?;
                println!("{}", manager.get_public_url(&key).await?);
                Ok(())
            }
            Commands::Stats => stats_command(&settings, &profiles).await,
            Commands::Config => {
                println!("config file: {}", Settings::config_file_path()?.display());
                let contents = toml::to_string_pretty(&settings)
                    .map_err(|e| PrismError::serialization(e.to_string()))?;
                print!("{contents}");
                Ok(())
            }
            Commands::Sync { command } => sync_command(command, &settings, &profiles).await,
            Commands::Login => {
                let gateway = GatewayClient::new(&settings.gateway_url)?;
                let url = gateway.open_login()?;
                println!("Continue the login in your browser: {url}");
                println!("Run 'prism whoami' once the flow completes.");
                Ok(())
            }
            Commands::Logout => {
                let gateway = GatewayClient::new(&settings.gateway_url)?;
                gateway.logout().await?;
                println!("Logged out.");
                Ok(())
            }
            Commands::Whoami => {
                let gateway = GatewayClient::new(&settings.gateway_url)?;
                let status = gateway.session_check().await?;
                match status.user.filter(|_| status.authenticated) {
                    Some(user) => {
                        println!("{} (id {})", user.name.as_deref().unwrap_or(&user.login), user.id)
                    }
                    None => println!("Not logged in."),
                }
                Ok(())
            }
            Commands::Completions { shell } => {
                clap_complete::generate(
                    shell,
                    &mut Cli::command(),
                    "prism",
                    &mut std::io::stdout(),
                );
                Ok(())
            }
        }
    }
}

/// Build a manager bound to the active profile
async fn active_manager(profiles: &ProfileStore) -> Result<StoreManager> {
    let profile = profiles.active_profile().await?.ok_or(PrismError::NotInitialized)?;
    let manager = StoreManager::new();
    manager.initialize(&profile).await?;
    Ok(manager)
}

async fn profile_command(
    command: ProfileCommands,
    profiles: &ProfileStore,
    formatter: &TableFormatter,
) -> Result<()> {
    match command {
        ProfileCommands::Add {
            name,
            account_id,
            access_key_id,
            bucket,
            endpoint,
            custom_domain,
            default,
        } => {
            let name = prompt_if_missing(name, "Profile name")?;
            let account_id = prompt_if_missing(account_id, "Account id")?;
            let access_key_id = prompt_if_missing(access_key_id, "Access key id")?;
            let secret_access_key = rpassword::prompt_password("Secret access key: ")
                .map_err(|e| PrismError::config(format!("could not read secret: {e}")))?;
            let bucket_name = prompt_if_missing(bucket, "Bucket name")?;

            let profile = ConnectionProfile {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.clone(),
                account_id,
                access_key_id,
                secret_access_key,
                bucket_name,
                endpoint: endpoint.filter(|e| !e.trim().is_empty()),
                custom_domain: custom_domain.filter(|d| !d.trim().is_empty()),
                is_default: default,
            };
            profiles.save_profile(profile).await?;
            println!("Profile '{name}' saved.");
            Ok(())
        }
        ProfileCommands::List => {
            let list = profiles.load_profiles().await?;
            let active = profiles.active_profile_id().await;
            let rows: Vec<ProfileRow> = list
                .iter()
                .map(|p| ProfileRow {
                    active: if active.as_deref() == Some(&p.id) { "*".to_string() } else { String::new() },
                    id: p.id.clone(),
                    name: p.name.clone(),
                    bucket: p.bucket_name.clone(),
                    account: p.account_id.clone(),
                    access_key: mask_secret(&p.access_key_id),
                })
                .collect();
            println!("{}", formatter.format_table(&rows)?);
            Ok(())
        }
        ProfileCommands::Use { profile } => {
            let found = profiles
                .find_profile(&profile)
                .await?
                .ok_or_else(|| PrismError::config(format!("no profile matches '{profile}'")))?;
            profiles.set_active(&found.id).await?;
            println!("Active profile: {}", found.name);
            Ok(())
        }
        ProfileCommands::Remove { profile, force } => {
            let found = profiles
                .find_profile(&profile)
                .await?
                .ok_or_else(|| PrismError::config(format!("no profile matches '{profile}'")))?;
            if !force && !confirm(&format!("Delete profile '{}'?", found.name))? {
                return Ok(());
            }
            profiles.delete_profile(&found.id).await?;
            if let Ok(cache) = ListingCache::open_default() {
                cache.invalidate(&found.id).await;
            }
            println!("Profile '{}' deleted.", found.name);
            Ok(())
        }
        ProfileCommands::Show { profile } => {
            let found = match profile {
                Some(needle) => profiles.find_profile(&needle).await?,
                None => profiles.active_profile().await?,
            }
            .ok_or_else(|| PrismError::config("no matching profile"))?;

            println!("id:             {}", found.id);
            println!("name:           {}", found.name);
            println!("account id:     {}", found.account_id);
            println!("access key id:  {}", mask_secret(&found.access_key_id));
            println!("bucket:         {}", found.bucket_name);
            if let Some(endpoint) = &found.endpoint {
                println!("endpoint:       {endpoint}");
            }
            if let Some(domain) = &found.custom_domain {
                println!("custom domain:  {domain}");
            }
            if found.is_default {
                println!("default:        yes");
            }
            Ok(())
        }
    }
}

async fn list_command(
    settings: &Settings,
    profiles: &ProfileStore,
    formatter: &TableFormatter,
    query: ViewQuery,
    follow_cursor: bool,
) -> Result<()> {
    let manager = active_manager(profiles).await?;
    let mut engine =
        ListingEngine::new(ListingCache::open_default()?, settings.remote_page_size);

    let mut stale_warning = None;
    if let Err(e) = engine.load_initial(&manager).await {
        // keep the last-known-good cache visible when the fresh fetch
        // fails, but make the failure obvious
        if engine.snapshot().is_none() {
            return Err(e);
        }
        stale_warning = Some(e.to_string());
    }
    if stale_warning.is_none() && follow_cursor {
        while engine.has_more() {
            engine.load_more(&manager).await?;
        }
    }

    let snapshot = engine.snapshot().expect("snapshot after load");
    let directories = engine.directories();
    let view = build_view(&snapshot.entries, &query);

    if let Some(message) = &stale_warning {
        eprintln!("warning: listing failed, showing cached state: {message}");
    }

    let rows: Vec<FileRow> = view
        .entries
        .iter()
        .map(|e| FileRow {
            key: e.key.clone(),
            size: format_size(e.size),
            modified: e
                .last_modified
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    println!("{}", formatter.format_table(&rows)?);

    if !directories.is_empty() {
        println!("Directories: {}", directories.join(", "));
    }
    println!(
        "Page {}/{} ({} matching, {} fetched{})",
        view.page,
        view.total_pages.max(1),
        view.total_matching,
        snapshot.entries.len(),
        if engine.has_more() { ", more on the server" } else { "" }
    );
    Ok(())
}

async fn upload_command(
    settings: &Settings,
    profiles: &ProfileStore,
    files: Vec<PathBuf>,
    dir: Option<String>,
    no_webp: bool,
) -> Result<()> {
    let manager = active_manager(profiles).await?;
    let mut upload_config = settings.upload.clone();
    if no_webp {
        upload_config.webp_transform = false;
    }
    let orchestrator =
        UploadOrchestrator::new(&manager, upload_config, &settings.default_upload_dir);

    let progress = MultiProgress::new();
    let style = ProgressStyle::with_template("{msg:30!} [{bar:30}] {percent:>3}% {prefix}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

    let tasks = files.iter().map(|file| {
        let (tx, rx) = mpsc::unbounded_channel();
        let bar = progress.add(ProgressBar::new(100).with_style(style.clone()));
        bar.set_message(file.display().to_string());

        let request = UploadRequest {
            source: file.clone(),
            directory: dir.clone(),
            content_type: None,
        };
        let orchestrator = &orchestrator;
        let file = file.clone();
        async move {
            // closing the sender once the upload resolves lets the
            // watcher drain the channel and finish
            let upload = async {
                let result = orchestrator.upload(request, &tx).await;
                drop(tx);
                result
            };
            let (outcome, state) = tokio::join!(upload, watch_upload(rx, bar));
            (file, outcome, state)
        }
    });

    let results = futures::future::join_all(tasks).await;

    let mut failures = Vec::new();
    for (file, outcome, _) in results {
        match outcome {
            Ok(outcome) => {
                let renamed = outcome
                    .processed_name
                    .map(|n| format!(" (re-encoded as {n})"))
                    .unwrap_or_default();
                println!(
                    "uploaded {} -> {}{renamed} ({})",
                    file.display(),
                    outcome.key,
                    format_size(outcome.bytes)
                );
            }
            Err(e) => failures.push(format!("{}: {e}", file.display())),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(PrismError::upload(format!(
            "{} of {} uploads failed: {}",
            failures.len(),
            files.len(),
            failures.join("; ")
        )))
    }
}

/// Drive one progress bar from an upload event channel
async fn watch_upload(
    mut events: mpsc::UnboundedReceiver<UploadEvent>,
    bar: ProgressBar,
) -> UploadState {
    let mut state = UploadState::Pending;
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::Started { .. } => {
                state = UploadState::Uploading;
            }
            UploadEvent::Progress { percent, bytes_per_sec } => {
                bar.set_position(percent as u64);
                bar.set_prefix(format_speed(bytes_per_sec));
            }
            UploadEvent::Completed { .. } => {
                state = UploadState::Completed;
                bar.finish();
            }
            UploadEvent::Failed { message } => {
                state = UploadState::Error;
                bar.abandon_with_message(message);
            }
        }
    }
    state
}

async fn delete_command(profiles: &ProfileStore, keys: Vec<String>, force: bool) -> Result<()> {
    let manager = active_manager(profiles).await?;

    if !force {
        let question = if keys.len() == 1 {
            format!("Delete '{}'?", keys[0])
        } else {
            format!("Delete {} objects?", keys.len())
        };
        if !confirm(&question)? {
            return Ok(());
        }
    }

    let result = if keys.len() == 1 {
        manager.delete_object(&keys[0]).await
    } else {
        manager.delete_objects(&keys).await
    };

    match result {
        Ok(()) => {
            println!("Deleted {} object(s).", keys.len());
            Ok(())
        }
        Err(e) => {
            // some subset may have been removed; only a fresh listing
            // shows what actually remains
            warn!("delete failed; run 'prism ls' to see the current state");
            Err(e)
        }
    }
}

async fn stats_command(settings: &Settings, profiles: &ProfileStore) -> Result<()> {
    let manager = active_manager(profiles).await?;
    let mut engine =
        ListingEngine::new(ListingCache::open_default()?, settings.remote_page_size);

    engine.load_initial(&manager).await?;
    while engine.has_more() {
        engine.load_more(&manager).await?;
    }

    let snapshot = engine.snapshot().expect("snapshot after load");
    println!("objects:     {}", snapshot.entries.len());
    println!("total size:  {}", format_size(snapshot.total_bytes()));
    println!("directories: {}", engine.directories().len());
    Ok(())
}

async fn sync_command(
    command: SyncCommands,
    settings: &Settings,
    profiles: &ProfileStore,
) -> Result<()> {
    let gateway = GatewayClient::new(&settings.gateway_url)?;
    match command {
        SyncCommands::Pull => {
            let values = gateway.fetch_profiles().await?;
            if values.is_empty() {
                println!("Remote config endpoint has no profiles.");
                return Ok(());
            }
            let imported = profiles.import_profiles(&values).await?;
            println!("Imported {} profile(s).", imported.len());
            Ok(())
        }
        SyncCommands::Push => {
            let list = profiles.load_profiles().await?;
            gateway.push_profiles(&list).await?;
            println!("Pushed {} profile(s).", list.len());
            Ok(())
        }
    }
}

fn prompt_if_missing(value: Option<String>, prompt: &str) -> Result<String> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) => Ok(v),
        None => dialoguer::Input::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(|e| PrismError::config(format!("could not read input: {e}"))),
    }
}

fn confirm(question: &str) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(question)
        .default(false)
        .interact()
        .map_err(|e| PrismError::config(format!("could not read confirmation: {e}")))
}
