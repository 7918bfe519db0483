//! HTTP surface of the fragment store.

use rocket::data::{Limits, ToByteUnit};
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::status::Custom;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::tokio::io::AsyncReadExt;
use rocket::{catch, catchers, get, post, routes, Build, Rocket, State};
use serde::{Deserialize, Serialize};
use tracing::warn;

use fragment_store::{CoordinatorError, ErrorKind, FragmentSet, FragmentSetId, StorageManager};

pub const OWNER_HEADER: &str = "X-Owner-Id";
pub const MAX_UPLOAD_MIB: u64 = 64;

/// Principal on whose behalf the request is made, supplied by an upstream gateway.
pub struct Owner(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Owner {
    type Error = &'static str;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match req.headers().get_one(OWNER_HEADER).map(str::trim) {
            Some(owner) if !owner.is_empty() => Outcome::Success(Owner(owner.to_string())),
            _ => Outcome::Error((Status::Unauthorized, "missing owner header")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub stage: Option<String>,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Coordinator(CoordinatorError),
    BadRequest(String),
}

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        ApiError::Coordinator(e)
    }
}

fn status_for(kind: ErrorKind) -> Status {
    match kind {
        ErrorKind::EmptyInput => Status::BadRequest,
        ErrorKind::NotFound => Status::NotFound,
        ErrorKind::InsufficientFragments => Status::ServiceUnavailable,
        ErrorKind::EncodingUnavailable | ErrorKind::DecodingFailed => Status::BadGateway,
        ErrorKind::StorageWriteFailed
        | ErrorKind::MetadataWriteFailed
        | ErrorKind::MetadataReadFailed
        | ErrorKind::MaintenanceFailed
        | ErrorKind::Configuration => Status::InternalServerError,
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let (status, body) = match self {
            ApiError::Coordinator(e) => {
                let kind = serde_json::to_value(e.kind())
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| format!("{:?}", e.kind()));
                (
                    status_for(e.kind()),
                    ErrorBody {
                        kind,
                        stage: Some(e.stage().to_string()),
                        message: e.to_string(),
                    },
                )
            }
            ApiError::BadRequest(message) => (
                Status::BadRequest,
                ErrorBody {
                    kind: "invalid_request".into(),
                    stage: None,
                    message,
                },
            ),
        };
        Custom(status, Json(body)).respond_to(req)
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_id(raw: &str) -> Result<FragmentSetId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid file id: {}", raw)))
}

#[derive(rocket::FromForm)]
pub struct Upload<'r> {
    file: TempFile<'r>,
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: FragmentSetId,
    pub original_name: String,
    pub fragment_count: usize,
}

#[post("/upload-file", data = "<upload>")]
async fn upload_file(
    storage: &State<StorageManager>,
    owner: Owner,
    upload: Form<Upload<'_>>,
) -> ApiResult<UploadResponse> {
    let upload = upload.into_inner();
    let original_name = upload
        .name
        .filter(|name| !name.trim().is_empty())
        .or_else(|| {
            upload
                .file
                .raw_name()
                .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        })
        .unwrap_or_else(|| "upload".to_string());

    let mut data = Vec::new();
    let reader = upload.file.open().await.map_err(|e| {
        warn!(error = %e, "failed to open uploaded file");
        ApiError::BadRequest(format!("unreadable upload: {}", e))
    })?;
    rocket::tokio::pin!(reader);
    reader
        .read_to_end(&mut data)
        .await
        .map_err(|e| ApiError::BadRequest(format!("unreadable upload: {}", e)))?;

    let set = storage.upload_file(&original_name, &data, &owner.0).await?;

    Ok(Json(UploadResponse {
        file_id: set.id,
        original_name: set.original_name,
        fragment_count: set.fragments_count,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub file_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub message: String,
    pub file_id: FragmentSetId,
    pub original_name: String,
    pub content: String,
    pub fragments_used: usize,
    pub fragments_skipped: usize,
}

#[post("/download-file", format = "json", data = "<request>")]
async fn download_file(
    storage: &State<StorageManager>,
    request: Json<DownloadRequest>,
) -> ApiResult<DownloadResponse> {
    let id = parse_id(&request.file_id)?;
    let file = storage.download_file(&id).await?;

    Ok(Json(DownloadResponse {
        message: format!(
            "{} reconstructed from {} fragments",
            file.original_name, file.fragments_used
        ),
        file_id: file.id,
        original_name: file.original_name,
        content: file.content,
        fragments_used: file.fragments_used,
        fragments_skipped: file.fragments_skipped,
    }))
}

#[get("/files")]
async fn list_files(storage: &State<StorageManager>) -> ApiResult<Vec<FragmentSet>> {
    Ok(Json(storage.list_files().await?))
}

#[get("/files/<id>")]
async fn file_info(storage: &State<StorageManager>, id: &str) -> ApiResult<FragmentSet> {
    let id = parse_id(id)?;
    Ok(Json(storage.file_info(&id).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}

#[get("/health")]
fn health() -> Json<Health> {
    Json(Health {
        status: "ok".into(),
    })
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> Custom<Json<ErrorBody>> {
    let kind = match status.code {
        401 => "unauthorized",
        404 => "not_found",
        413 => "payload_too_large",
        _ => "invalid_request",
    };
    Custom(
        status,
        Json(ErrorBody {
            kind: kind.into(),
            stage: None,
            message: status.reason().unwrap_or("request failed").to_string(),
        }),
    )
}

pub fn build(storage: StorageManager) -> Rocket<Build> {
    let limits = Limits::default()
        .limit("file", MAX_UPLOAD_MIB.mebibytes())
        .limit("data-form", MAX_UPLOAD_MIB.mebibytes());
    let figment = rocket::Config::figment().merge(("limits", limits));

    rocket::custom(figment)
        .manage(storage)
        .mount(
            "/",
            routes![upload_file, download_file, list_files, file_info, health],
        )
        .register("/", catchers![default_catcher])
}
