use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

// D-Bus proxy for the rollcalld daemon.
#[zbus::proxy(
    interface = "org.rollcall.Rollcall1",
    default_service = "org.rollcall.Rollcall1",
    default_path = "/org/rollcall/Rollcall1"
)]
trait Rollcall {
    async fn check_in(
        &self,
        session_id: i64,
        principal_id: i64,
        image: Vec<u8>,
        model: &str,
        try_fallback: bool,
    ) -> zbus::Result<String>;

    async fn set_status(
        &self,
        session_id: i64,
        student_id: i64,
        principal_id: i64,
        status: &str,
        late_minutes: i64,
    ) -> zbus::Result<String>;

    async fn enroll(
        &self,
        identity_id: i64,
        principal_id: i64,
        images: Vec<Vec<u8>>,
        device_id: &str,
    ) -> zbus::Result<String>;

    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall biometric attendance CLI")]
struct Cli {
    /// Acting principal id (who is making this request)
    #[arg(short, long, global = true, default_value_t = 0)]
    principal: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a face image and record attendance for a session
    CheckIn {
        /// Class session id
        #[arg(short, long)]
        session: i64,
        /// Path to the face image
        image: PathBuf,
        /// Embedding model to try first (daemon default when omitted)
        #[arg(short, long)]
        model: Option<String>,
        /// Retry with the fallback model when the first one misses
        #[arg(long)]
        try_fallback: bool,
    },
    /// Manually set attendance status (admin/teacher only)
    SetStatus {
        #[arg(short, long)]
        session: i64,
        #[arg(long)]
        student: i64,
        /// "present" or "late"
        status: String,
        #[arg(long, default_value_t = 0)]
        late_minutes: i64,
    },
    /// Enroll face images for an identity (self or admin only)
    Enroll {
        /// Identity to enroll embeddings for
        #[arg(long)]
        identity: i64,
        /// Face image path; repeat for a batch
        #[arg(short, long, required = true)]
        image: Vec<PathBuf>,
        /// Capture device label stored with the embeddings
        #[arg(long, default_value = "cli")]
        device: String,
    },
    /// Show daemon status
    Status,
}

fn print_json(raw: &str) {
    // Pretty-print when the payload is JSON, pass through otherwise.
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
        Err(_) => println!("{raw}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("connect to session bus (is rollcalld running?)")?;
    let proxy = RollcallProxy::new(&connection)
        .await
        .context("create rollcalld proxy")?;

    match cli.command {
        Commands::CheckIn {
            session,
            image,
            model,
            try_fallback,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("read image {}", image.display()))?;
            let result = proxy
                .check_in(
                    session,
                    cli.principal,
                    bytes,
                    model.as_deref().unwrap_or(""),
                    try_fallback,
                )
                .await?;
            print_json(&result);
        }
        Commands::SetStatus {
            session,
            student,
            status,
            late_minutes,
        } => {
            let result = proxy
                .set_status(session, student, cli.principal, &status, late_minutes)
                .await?;
            print_json(&result);
        }
        Commands::Enroll {
            identity,
            image,
            device,
        } => {
            let mut images = Vec::with_capacity(image.len());
            for path in &image {
                images.push(
                    std::fs::read(path).with_context(|| format!("read image {}", path.display()))?,
                );
            }
            let result = proxy.enroll(identity, cli.principal, images, &device).await?;
            print_json(&result);
        }
        Commands::Status => {
            let result = proxy.status().await?;
            print_json(&result);
        }
    }

    Ok(())
}
