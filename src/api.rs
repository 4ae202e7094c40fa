//! Annotation backend client.
//!
//! [`AnnotationBackend`] is the seam between the UI and the HTTP service; the
//! application only ever talks to it through a trait object so sessions can be
//! exercised against an in-memory backend.

use crate::catalog::ClassId;
use crate::config::AppConfig;
use crate::coords::CenterBox;
use crate::error::ClientError;
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

pub type ImageId = u64;

/// One detection as stored by the backend: center form, natural pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    /// Index the backend addresses this detection by, when known.
    pub detection_id: Option<u32>,
    pub geometry: CenterBox,
    pub name: String,
    pub class_id: Option<ClassId>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessedImage {
    pub id: Option<u64>,
    pub filename: Option<String>,
    pub detections: Vec<DetectionRecord>,
}

/// A corrected box posted back to the backend. `label` is the class name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationUpdate {
    pub detection_id: Option<u32>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub label: String,
}

pub trait AnnotationBackend: Send + Sync {
    /// Raw image ids, optionally restricted to images with a detection of `class_name`.
    fn list_images(&self, class_name: Option<&str>) -> Result<Vec<ImageId>, ClientError>;

    /// Encoded bytes of the raw image.
    fn raw_image(&self, id: ImageId) -> Result<Vec<u8>, ClientError>;

    fn detections(&self, id: ImageId) -> Result<ProcessedImage, ClientError>;

    fn save_annotations(&self, id: ImageId, updates: &[AnnotationUpdate]) -> Result<(), ClientError>;

    /// Uploads one image and returns the ids of the processed images created for it.
    fn upload_image(&self, path: &Path) -> Result<Vec<ImageId>, ClientError>;

    /// Uploads a zip archive of images.
    fn upload_folder(&self, zip: &Path) -> Result<Vec<ImageId>, ClientError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Backend
// ─────────────────────────────────────────────────────────────────────────────

pub struct HttpBackend {
    base_url: String,
    client: Client,
    token: Mutex<Option<String>>,
    credentials: Option<(String, String)>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl HttpBackend {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|err| {
                log::warn!("Falling back to a default HTTP client: {err}");
                Client::new()
            });

        Self {
            base_url: config.api_base_url.clone(),
            client,
            token: Mutex::new(config.access_token.clone()),
            credentials: config
                .credentials()
                .map(|(user, password)| (user.to_string(), password.to_string())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{base_url}{path}", base_url = self.base_url)
    }

    /// Exchanges credentials for a bearer token.
    pub fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .post(self.url("/token"))
            .form(&[("username", username), ("password", password)])
            .send()?;
        let token: TokenResponse = check_status(response)?.json()?;
        log::info!("Authenticated as {username}");
        Ok(token.access_token)
    }

    fn bearer_token(&self) -> Result<Option<String>, ClientError> {
        let mut token = self.token.lock().unwrap_or_else(|e| e.into_inner());
        if token.is_none() {
            if let Some((user, password)) = &self.credentials {
                *token = Some(self.login(user, password)?);
            }
        }
        Ok(token.clone())
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let request = match self.bearer_token()? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        check_status(request.send()?)
    }

    fn get_json(&self, path: &str) -> Result<Value, ClientError> {
        let response = self.send(self.client.get(self.url(path)))?;
        Ok(response.json()?)
    }

    fn upload(&self, path: &str, field: &str, file: &Path) -> Result<Vec<ImageId>, ClientError> {
        let form = multipart::Form::new().file(field.to_string(), file)?;
        let response = self.send(self.client.post(self.url(path)).multipart(form))?;
        let body = response.text()?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_upload_ids(&serde_json::from_str(&body)?)
    }
}

impl AnnotationBackend for HttpBackend {
    fn list_images(&self, class_name: Option<&str>) -> Result<Vec<ImageId>, ClientError> {
        match class_name {
            None => parse_image_ids(&self.get_json("/raw-images")?),
            Some(name) => match self.get_json(&format!("/detection-images/{name}")) {
                Ok(body) => parse_image_ids(&body),
                // The class query answers 404 when nothing matched.
                Err(err) if err.is_not_found() => Ok(Vec::new()),
                Err(err) => Err(err),
            },
        }
    }

    fn raw_image(&self, id: ImageId) -> Result<Vec<u8>, ClientError> {
        let response = self.send(self.client.get(self.url(&format!("/raw-images/{id}"))))?;
        Ok(response.bytes()?.to_vec())
    }

    fn detections(&self, id: ImageId) -> Result<ProcessedImage, ClientError> {
        parse_processed_image(self.get_json(&format!("/processed-images/{id}"))?)
    }

    fn save_annotations(&self, id: ImageId, updates: &[AnnotationUpdate]) -> Result<(), ClientError> {
        let request = self
            .client
            .post(self.url(&format!("/annotations/{id}")))
            .json(updates);
        self.send(request)?;
        log::info!("Saved {} annotation(s) for image {id}", updates.len());
        Ok(())
    }

    fn upload_image(&self, path: &Path) -> Result<Vec<ImageId>, ClientError> {
        self.upload("/upload/raw-image", "file", path)
    }

    fn upload_folder(&self, zip: &Path) -> Result<Vec<ImageId>, ClientError> {
        self.upload("/upload/raw-images-folder", "folder", zip)
    }
}

/// Turns a non-success response into [`ClientError::Status`], using the `detail` field when present.
fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        detail: error_detail(&body),
    })
}

fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawDetection {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    #[serde(default)]
    name: String,
    #[serde(default)]
    class_id: Option<ClassId>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    id: Option<u32>,
}

/// Parses a processed-image body. `metadata` may be a list of detections, a
/// map keyed by detection index, or an object wrapping a `detections` list.
pub fn parse_processed_image(body: Value) -> Result<ProcessedImage, ClientError> {
    let Value::Object(mut body) = body else {
        return Err(ClientError::Malformed(
            "processed image is not an object".to_string(),
        ));
    };
    let metadata = body
        .remove("metadata")
        .ok_or_else(|| ClientError::Malformed("processed image has no metadata".to_string()))?;

    let metadata = match metadata {
        Value::Object(mut map) if map.get("detections").is_some_and(Value::is_array) => {
            map.remove("detections").unwrap_or(Value::Null)
        }
        other => other,
    };

    let mut entries: Vec<(Option<u32>, Value)> = match metadata {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| (u32::try_from(index).ok(), item))
            .collect(),
        Value::Object(map) => map.into_iter().map(|(key, item)| (key.parse().ok(), item)).collect(),
        Value::Null => Vec::new(),
        other => {
            return Err(ClientError::Malformed(format!(
                "unexpected metadata shape: {other}"
            )))
        }
    };
    // Map keys arrive in string order ("10" before "2").
    entries.sort_by_key(|(key, _)| key.unwrap_or(u32::MAX));

    let detections = entries
        .into_iter()
        .filter_map(|(key, item)| match serde_json::from_value::<RawDetection>(item) {
            Ok(raw) => Some(DetectionRecord {
                detection_id: raw.id.or(key),
                geometry: CenterBox {
                    x: raw.x,
                    y: raw.y,
                    width: raw.width,
                    height: raw.height,
                },
                name: raw.name,
                class_id: raw.class_id,
                confidence: raw.confidence,
            }),
            Err(err) => {
                log::warn!("Skipping unreadable detection {key:?}: {err}");
                None
            }
        })
        .collect();

    Ok(ProcessedImage {
        id: body.get("id").and_then(Value::as_u64),
        filename: body
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string),
        detections,
    })
}

fn id_of(value: &Value) -> Option<ImageId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("id").and_then(id_of),
        _ => None,
    }
}

/// Accepts a list of ids, a list of `{id}` objects, or `{image_ids: [...]}`.
pub fn parse_image_ids(body: &Value) -> Result<Vec<ImageId>, ClientError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("image_ids") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ClientError::Malformed(
                    "image list has no image_ids".to_string(),
                ))
            }
        },
        other => {
            return Err(ClientError::Malformed(format!(
                "unexpected image list: {other}"
            )))
        }
    };
    Ok(items.iter().filter_map(id_of).collect())
}

/// Accepts `{processed_image_id}` or `{processed_image_ids: [...]}`.
pub fn parse_upload_ids(body: &Value) -> Result<Vec<ImageId>, ClientError> {
    if let Some(id) = body.get("processed_image_id").and_then(id_of) {
        return Ok(vec![id]);
    }
    match body.get("processed_image_ids") {
        Some(Value::Array(items)) => Ok(items.iter().filter_map(id_of).collect()),
        _ if body.is_null() => Ok(Vec::new()),
        _ => Err(ClientError::Malformed(
            "upload response has no processed image ids".to_string(),
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory backend for tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;

    /// Backend answering from fixed maps and recording every save.
    #[derive(Default)]
    pub struct FakeBackend {
        pub images: Vec<ImageId>,
        pub processed: HashMap<ImageId, ProcessedImage>,
        pub raw: HashMap<ImageId, Vec<u8>>,
        pub fail_saves: bool,
        pub saved: Mutex<Vec<(ImageId, Vec<AnnotationUpdate>)>>,
    }

    impl FakeBackend {
        pub fn saved(&self) -> Vec<(ImageId, Vec<AnnotationUpdate>)> {
            self.saved.lock().unwrap().clone()
        }
    }

    fn missing(what: &str) -> ClientError {
        ClientError::Status {
            status: 404,
            detail: format!("{what} not found"),
        }
    }

    impl AnnotationBackend for FakeBackend {
        fn list_images(&self, class_name: Option<&str>) -> Result<Vec<ImageId>, ClientError> {
            Ok(match class_name {
                None => self.images.clone(),
                Some(name) => self
                    .images
                    .iter()
                    .copied()
                    .filter(|id| {
                        self.processed
                            .get(id)
                            .is_some_and(|p| p.detections.iter().any(|d| d.name == name))
                    })
                    .collect(),
            })
        }

        fn raw_image(&self, id: ImageId) -> Result<Vec<u8>, ClientError> {
            self.raw.get(&id).cloned().ok_or_else(|| missing("Image"))
        }

        fn detections(&self, id: ImageId) -> Result<ProcessedImage, ClientError> {
            self.processed
                .get(&id)
                .cloned()
                .ok_or_else(|| missing("Processed image"))
        }

        fn save_annotations(&self, id: ImageId, updates: &[AnnotationUpdate]) -> Result<(), ClientError> {
            if self.fail_saves {
                return Err(ClientError::Status {
                    status: 500,
                    detail: "database unavailable".to_string(),
                });
            }
            self.saved.lock().unwrap().push((id, updates.to_vec()));
            Ok(())
        }

        fn upload_image(&self, _path: &Path) -> Result<Vec<ImageId>, ClientError> {
            Ok(vec![self.images.last().copied().unwrap_or(0) + 1])
        }

        fn upload_folder(&self, _zip: &Path) -> Result<Vec<ImageId>, ClientError> {
            Ok(Vec::new())
        }
    }
}
