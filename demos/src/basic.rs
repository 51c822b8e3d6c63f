use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{FromRef, Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use postbox::mail::{MailError, MailHandler, MailJob, SmtpMailer, Templates};
use postbox::{Dispatcher, DispatcherConfig, EnvConfig, Lifecycle, SubmitError, TaskTracker};
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_template_dir")]
    template_dir: PathBuf,
}

fn default_port() -> u16 {
    3030
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("demos/templates")
}

#[derive(Clone, FromRef)]
pub struct Context {
    pub mail: Dispatcher<MailJob>,
    pub in_flight: TaskTracker,
    /// Generated invoices. Removed once the dispatcher has stopped.
    pub invoices: Arc<TempDir>,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Bad request: {0}")]
    BadRequest(#[from] MailError),

    #[error("Shutting down")]
    ShuttingDown,
}

impl From<SubmitError<MailJob>> for Error {
    fn from(_: SubmitError<MailJob>) -> Self {
        Error::ShuttingDown
    }
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Error Status {}: {}", status, self);
        }

        let body = Json(json!({
            "code": status.as_u16(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

type Result<T> = std::result::Result<T, Error>;
type JsonResult<T> = Result<Json<T>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let dispatch = DispatcherConfig::load()?;

    let mailer = SmtpMailer::from_env()?;
    let templates = Templates::from_dir(&config.template_dir);
    let mail = Dispatcher::builder(MailHandler::new(mailer, templates))
        .config(&dispatch)
        .start();

    let in_flight = TaskTracker::new();
    let lifecycle = Lifecycle::new(mail.clone(), in_flight.clone())
        .drain_timeout(dispatch.drain_timeout());

    let invoices = Arc::new(tempfile::tempdir()?);
    let ctx = Context {
        mail,
        in_flight,
        invoices: invoices.clone(),
    };
    let addr = (Ipv4Addr::UNSPECIFIED, config.port);
    let outcome = postbox::serve(addr, api_router(ctx), lifecycle).await?;
    tracing::info!(?outcome, "bye");

    // The worker has exited, nothing reads the invoices anymore.
    drop(invoices);
    Ok(())
}

fn api_router(ctx: Context) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/invoice", post(invoice))
        .with_state(ctx)
}

async fn health(State(mail): State<Dispatcher<MailJob>>) -> JsonResult<Value> {
    Ok(Json(json!({
        "ok": mail.is_running(),
        "queued": mail.queued(),
    })))
}

#[derive(Deserialize)]
struct RegisterReq {
    email: String,
}

async fn register(
    State(mail): State<Dispatcher<MailJob>>,
    Json(data): Json<RegisterReq>,
) -> JsonResult<Value> {
    let token = demo_token(&data.email);
    let link = format!("https://example.com/activate?token={token}");

    let job = MailJob::builder()
        .to(&data.email)
        .subject("Activate Your Account")
        .template("confirmation-email")
        .data(link)
        .build()?;
    mail.submit(job).await?;

    Ok(Json(json!({"message": "check your inbox"})))
}

#[derive(Deserialize)]
struct LoginReq {
    email: String,
    password: String,
}

async fn login(
    State(mail): State<Dispatcher<MailJob>>,
    Json(data): Json<LoginReq>,
) -> JsonResult<Value> {
    // Hardcoded demo credentials
    if data.password == "password" {
        return Ok(Json(json!({"message": "welcome"})));
    }

    let job = MailJob::builder()
        .to(&data.email)
        .subject("Failed login attempt")
        .data("Invalid login attempt")
        .build()?;
    mail.submit(job).await?;

    Err(Error::InvalidCredentials)
}

#[derive(Deserialize)]
struct InvoiceReq {
    email: String,
    total: u64,
}

/// Generates the invoice in the background. Shutdown waits for the task
/// before stopping the dispatcher, so its mail is still accepted.
async fn invoice(State(ctx): State<Context>, Json(data): Json<InvoiceReq>) -> Result<StatusCode> {
    if ctx.in_flight.is_closed() {
        return Err(Error::ShuttingDown);
    }

    let mail = ctx.mail.clone();
    let invoices = ctx.invoices.clone();
    ctx.in_flight.spawn(async move {
        if let Err(e) = send_invoice(mail, invoices.path(), data).await {
            tracing::error!(error = %e, "invoice not sent");
        }
    });

    Ok(StatusCode::ACCEPTED)
}

async fn send_invoice(
    mail: Dispatcher<MailJob>,
    dir: &Path,
    data: InvoiceReq,
) -> anyhow::Result<()> {
    let path = write_invoice(dir, &data).await?;

    let job = MailJob::builder()
        .to(&data.email)
        .subject("Your invoice")
        .data(format!("Your invoice total is {}.", data.total))
        .attach(&path)
        .build()?;
    mail.submit(job).await?;
    Ok(())
}

async fn write_invoice(dir: &Path, data: &InvoiceReq) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("invoice-{}.txt", demo_token(&data.email)));
    let contents = format!("Invoice for {}\nTotal: {}\n", data.email, data.total);
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}

/// Deterministic demo token. Not for real activation links.
fn demo_token(seed: &str) -> String {
    use std::hash::{DefaultHasher, Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
