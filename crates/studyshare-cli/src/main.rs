//! StudyShare CLI - share lecture notes from the terminal
//!
//! Talks to the same hosted backend as the app front-ends: profile
//! management, note upload, browsing, download, and delete.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use serde::Serialize;
use studyshare_core::backend::supabase::{SupabaseClient, SupabaseConfig};
use studyshare_core::models::{NoteDraft, ProfileDraft, Year};
use studyshare_core::workflows::{
    NoteIngestion, NotesCatalog, ProfileState, ProfileSync, RepairReport, UploadFile,
};
use studyshare_core::Note;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "studyshare")]
#[command(about = "Share lecture notes with classmates from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or update your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// List shared notes, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload a note file with its metadata
    Upload {
        /// Note title
        title: String,
        /// Subject the note belongs to
        #[arg(short, long)]
        subject: String,
        /// Optional free-form description
        #[arg(short, long)]
        description: Option<String>,
        /// File to upload
        file: PathBuf,
    },
    /// Download a note's file
    Download {
        /// Note ID or unique ID prefix
        id: String,
        /// Optional output path (derived from the note title when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Delete a note and its file
    Delete {
        /// Note ID or unique ID prefix
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Reconcile rows left behind by interrupted uploads
    Repair,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the current profile
    Show,
    /// Create or update the profile
    Save {
        /// Display name
        #[arg(long)]
        name: String,
        /// Course, e.g. "B.Tech"
        #[arg(long)]
        course: String,
        /// Branch, e.g. "Computer Science"
        #[arg(long)]
        branch: String,
        /// Year of study (1-4)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
        year: u8,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] studyshare_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(
        "Backend is not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY (and SUPABASE_ACCESS_TOKEN for signed-in commands)."
    )]
    MissingConfig,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Aborted")]
    Aborted,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("studyshare=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Profile { command }) => match command {
            ProfileCommands::Show => run_profile_show().await?,
            ProfileCommands::Save {
                name,
                course,
                branch,
                year,
            } => run_profile_save(&name, &course, &branch, year).await?,
        },
        Some(Commands::List { json }) => run_list(json).await?,
        Some(Commands::Upload {
            title,
            subject,
            description,
            file,
        }) => run_upload(&title, &subject, description.as_deref(), &file).await?,
        Some(Commands::Download { id, output }) => run_download(&id, output.as_deref()).await?,
        Some(Commands::Delete { id, yes }) => run_delete(&id, yes).await?,
        Some(Commands::Repair) => run_repair().await?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}

fn connect() -> Result<SupabaseClient, CliError> {
    let config = SupabaseConfig::from_env()?.ok_or(CliError::MissingConfig)?;
    Ok(SupabaseClient::new(config)?)
}

async fn run_profile_show() -> Result<(), CliError> {
    let client = connect()?;
    let mut profile = ProfileSync::new(client.clone(), client);

    match profile.load().await? {
        ProfileState::NoSession => println!("Not signed in."),
        ProfileState::Creating | ProfileState::Editing(_) => {
            println!("No profile yet. Create one with `studyshare profile save`.");
        }
        ProfileState::Viewing(profile) => {
            println!("Name:   {}", profile.name);
            println!("Course: {}", profile.course);
            println!("Branch: {}", profile.branch);
            println!("Year:   {}", profile.year);
        }
    }
    Ok(())
}

async fn run_profile_save(
    name: &str,
    course: &str,
    branch: &str,
    year: u8,
) -> Result<(), CliError> {
    let year = Year::try_from(year).map_err(studyshare_core::Error::InvalidInput)?;
    let draft = ProfileDraft {
        name: name.to_string(),
        course: course.to_string(),
        branch: branch.to_string(),
        year,
    };

    let client = connect()?;
    let mut profile = ProfileSync::new(client.clone(), client);
    profile.load().await?;
    let saved = profile.save(&draft).await?;

    println!("Saved profile for {} ({})", saved.name, saved.year);
    Ok(())
}

#[derive(Debug, Serialize)]
struct NoteListItem {
    id: String,
    title: String,
    subject: String,
    description: Option<String>,
    file_path: String,
    created_at: String,
    uploaded: String,
}

async fn run_list(as_json: bool) -> Result<(), CliError> {
    let client = connect()?;
    let mut catalog = NotesCatalog::new(client.clone(), client);
    let notes = catalog.list().await?;

    if as_json {
        let now = Utc::now();
        let items = notes
            .iter()
            .map(|note| note_to_list_item(note, now))
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if notes.is_empty() {
        println!("No notes shared yet.");
    } else {
        let now = Utc::now();
        for line in format_note_lines(notes, now) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_upload(
    title: &str,
    subject: &str,
    description: Option<&str>,
    file_path: &Path,
) -> Result<(), CliError> {
    if !file_path.is_file() {
        return Err(CliError::FileNotFound(file_path.to_path_buf()));
    }
    let file_name = file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = std::fs::read(file_path)?;

    let draft = NoteDraft {
        title: title.to_string(),
        description: description.map(str::to_string),
        subject: subject.to_string(),
    };
    let file = UploadFile {
        content_type: guess_content_type(&file_name).map(str::to_string),
        file_name,
        bytes,
    };

    let client = connect()?;
    let mut ingestion = NoteIngestion::new(client.clone(), client.clone(), client);
    ingestion.ensure_bucket().await?;
    let note = ingestion.ingest(&draft, &file).await?;

    tracing::info!(note_id = %note.id, key = %note.file_path, "Uploaded note");
    println!("{}", note.id);
    Ok(())
}

async fn run_download(id: &str, output: Option<&Path>) -> Result<(), CliError> {
    let client = connect()?;
    let mut catalog = NotesCatalog::new(client.clone(), client);
    catalog.list().await?;

    let note = resolve_note(catalog.notes(), id)?;
    let downloaded = catalog.download(&note).await?;

    let path = output.map_or_else(
        || PathBuf::from(&downloaded.suggested_name),
        Path::to_path_buf,
    );
    write_atomically(&path, &downloaded.bytes)?;
    println!("{}", path.display());
    Ok(())
}

async fn run_delete(id: &str, skip_confirmation: bool) -> Result<(), CliError> {
    let client = connect()?;
    let mut catalog = NotesCatalog::new(client.clone(), client);
    catalog.list().await?;

    let note = resolve_note(catalog.notes(), id)?;
    if !skip_confirmation {
        print!("Delete note '{}'? [y/N] ", note.title);
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !parse_confirmation(&answer) {
            return Err(CliError::Aborted);
        }
    }

    catalog.delete(&note.id).await?;
    tracing::info!(note_id = %note.id, "Deleted note");
    println!("{}", note.id);
    Ok(())
}

async fn run_repair() -> Result<(), CliError> {
    let client = connect()?;
    let mut ingestion = NoteIngestion::new(client.clone(), client.clone(), client);
    ingestion.ensure_bucket().await?;
    let report = ingestion.repair().await?;

    println!("{}", repair_summary(&report));
    for id in &report.skipped {
        println!("  needs manual attention: {id}");
    }
    Ok(())
}

/// Log and render the repair outcome.
fn repair_summary(report: &RepairReport) -> String {
    tracing::info!(
        patched = report.patched.len(),
        deleted = report.deleted.len(),
        skipped = report.skipped.len(),
        "Repair finished"
    );
    format!(
        "Repair finished: {} patched, {} deleted, {} skipped",
        report.patched.len(),
        report.deleted.len(),
        report.skipped.len()
    )
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "studyshare", buffer);
}

/// Match a note by exact id or a unique id prefix.
fn resolve_note(notes: &[Note], query: &str) -> Result<Note, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::NoteNotFound(query.to_string()));
    }

    if let Some(note) = notes.iter().find(|note| note.id.as_str() == query) {
        return Ok(note.clone());
    }

    let matches: Vec<&Note> = notes
        .iter()
        .filter(|note| note.id.as_str().starts_with(query))
        .collect();
    match matches.as_slice() {
        [] => Err(CliError::NoteNotFound(query.to_string())),
        [note] => Ok((*note).clone()),
        several => {
            let options = several
                .iter()
                .take(3)
                .map(|note| short_id(note.id.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Write via a sibling temp file so a failed download never leaves a
/// truncated file at the target path.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    let temp = path.with_extension("part");
    if let Err(error) = std::fs::write(&temp, bytes) {
        let _ = std::fs::remove_file(&temp);
        return Err(error.into());
    }
    if let Err(error) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(error.into());
    }
    Ok(())
}

fn format_note_lines(notes: &[Note], now: DateTime<Utc>) -> Vec<String> {
    notes
        .iter()
        .map(|note| {
            let id = short_id(note.id.as_str());
            let title = truncate(&note.title, 32);
            let subject = truncate(&note.subject, 20);
            let uploaded = format_relative_time(note.created_at, now);
            format!("{id:<13}  {title:<32}  {subject:<20}  {uploaded}")
        })
        .collect()
}

fn note_to_list_item(note: &Note, now: DateTime<Utc>) -> NoteListItem {
    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        subject: note.subject.clone(),
        description: note.description.clone(),
        file_path: note.file_path.clone(),
        created_at: note.created_at.to_rfc3339(),
        uploaded: format_relative_time(note.created_at, now),
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = now.signed_duration_since(timestamp).num_minutes().max(0);
    let hours = minutes / 60;
    let days = hours / 24;

    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else if days < 30 {
        format!("{}w ago", days / 7)
    } else if days < 365 {
        format!("{}mo ago", days / 30)
    } else {
        format!("{}y ago", days / 365)
    }
}

fn parse_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Content type for the common note formats; everything else is left
/// for the backend to default.
fn guess_content_type(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit_once('.')?.1.to_lowercase();
    match extension.as_str() {
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        "ppt" => Some("application/vnd.ms-powerpoint"),
        "pptx" => {
            Some("application/vnd.openxmlformats-officedocument.presentationml.presentation")
        }
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}
