use clap::{Parser, Subcommand};
use parquedb::config::StorageConfig;
use parquedb::event::{Event, Op};
use parquedb::merge::{MergeOptions, Resolution};
use parquedb::schema::{FieldDef, Primitive, TypeDefinition};
use parquedb::Repository;
use std::path::{Path, PathBuf};

/// The demo schema every invocation registers: a single "notes" collection
/// with a shredded `priority` column and a residual `body` field.
fn notes_schema() -> TypeDefinition {
    TypeDefinition {
        name: "notes".into(),
        fields: vec![
            FieldDef { name: "body".into(), primitive: Primitive::String, indexed: false },
            FieldDef { name: "priority".into(), primitive: Primitive::Int, indexed: false },
        ],
    }
}

#[derive(Parser)]
#[command(
    name = "parquedb-demo",
    version,
    about = "Smoke-test harness for the versioned, branchable document store"
)]
struct Cli {
    /// Database path (default: ./parquedb.sqlite)
    #[arg(long, default_value = "parquedb.sqlite")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new repository
    Init,
    /// Create a note on the current branch
    Put {
        id: String,
        body: String,
        #[arg(long, default_value = "0")]
        priority: i64,
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Read a note back by id
    Get { id: String },
    /// Show commit history for a branch
    Log {
        #[arg(default_value = "main")]
        branch: String,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Create a branch from the current HEAD
    Branch { name: String },
    /// List branches
    Branches,
    /// Merge a branch into another, resolving every conflict with `ours`
    Merge {
        source: String,
        #[arg(default_value = "main")]
        target: String,
        #[arg(short, long)]
        message: Option<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => cmd_init(&cli.db),
        Commands::Put { id, body, priority, message } => {
            cmd_put(&cli.db, &id, &body, priority, message.as_deref())
        }
        Commands::Get { id } => cmd_get(&cli.db, &id),
        Commands::Log { branch, limit } => cmd_log(&cli.db, &branch, limit),
        Commands::Branch { name } => cmd_branch(&cli.db, &name),
        Commands::Branches => cmd_branches(&cli.db),
        Commands::Merge { source, target, message } => {
            cmd_merge(&cli.db, &source, &target, message.as_deref())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn open(path: &Path) -> parquedb::Result<Repository> {
    let repo = Repository::open(StorageConfig::sqlite(path).build()?);
    repo.define_collection(notes_schema());
    Ok(repo)
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn cmd_init(path: &Path) -> parquedb::Result<()> {
    Repository::init(StorageConfig::sqlite(path).build()?)?;
    println!("Initialized parquedb repository at {}", path.display());
    Ok(())
}

fn cmd_put(path: &Path, id: &str, body: &str, priority: i64, msg: Option<&str>) -> parquedb::Result<()> {
    let repo = open(path)?;
    let branch = repo.branches().current()?.unwrap_or_else(|| "main".into());

    let mut after = serde_json::Map::new();
    after.insert("body".into(), serde_json::json!(body));
    after.insert("priority".into(), serde_json::json!(priority));
    let event = Event {
        id: format!("evt-{id}-{}", now()),
        ts: now(),
        op: Op::Create,
        target: format!("notes:{id}"),
        before: None,
        after: Some(after),
        metadata: None,
    };

    let hash = repo.commit_events(
        &branch,
        "notes",
        vec![event],
        msg.unwrap_or("put note").to_string(),
        "demo".into(),
        now(),
    )?;
    println!("[{}] note {id}", &hash[..8.min(hash.len())]);
    Ok(())
}

fn cmd_get(path: &Path, id: &str) -> parquedb::Result<()> {
    let repo = open(path)?;
    let branch = repo.branches().current()?.unwrap_or_else(|| "main".into());
    match repo.get(&branch, "notes", id)? {
        Some(doc) => println!("{}", serde_json::Value::Object(doc)),
        None => println!("(not found)"),
    }
    Ok(())
}

fn cmd_log(path: &Path, branch: &str, limit: usize) -> parquedb::Result<()> {
    let repo = open(path)?;
    let commits = repo.log(branch, limit)?;
    if commits.is_empty() {
        println!("(no commits yet)");
    }
    for commit in commits {
        println!("{} {} {}", &commit.hash[..8.min(commit.hash.len())], commit.ts, commit.message);
    }
    Ok(())
}

fn cmd_branch(path: &Path, name: &str) -> parquedb::Result<()> {
    let repo = open(path)?;
    repo.branches().create(name, &Default::default())?;
    println!("Created branch '{name}'");
    Ok(())
}

fn cmd_branches(path: &Path) -> parquedb::Result<()> {
    let repo = open(path)?;
    for branch in repo.branches().list()? {
        let marker = if branch.is_current { "*" } else { " " };
        println!("{marker} {}", branch.name);
    }
    Ok(())
}

fn cmd_merge(path: &Path, source: &str, target: &str, msg: Option<&str>) -> parquedb::Result<()> {
    let repo = open(path)?;
    let outcome = repo.merge(
        source,
        target,
        MergeOptions::default(),
        "demo".into(),
        msg.unwrap_or("merge").to_string(),
        now(),
    )?;

    if outcome.fast_forwarded {
        println!("Fast-forwarded '{target}' to '{source}'");
        return Ok(());
    }

    if !outcome.conflicts.is_empty() {
        println!("{} conflict(s); resolving with 'ours' for this demo run:", outcome.conflicts.len());
        for conflict in &outcome.conflicts {
            println!("  {}/{}", conflict.collection, conflict.entity_id);
            repo.resolve_conflict(&conflict.path(), Resolution::Ours, None)?;
        }
        let hash = repo.complete_merge("demo".into(), msg.unwrap_or("merge").to_string(), now())?;
        println!("[{}] merge commit", &hash[..8.min(hash.len())]);
        return Ok(());
    }

    if let Some(hash) = outcome.commit {
        println!("[{}] merge commit", &hash[..8.min(hash.len())]);
    }
    Ok(())
}
