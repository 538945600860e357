use crate::client::{ApiClient, MultipartForm, RequestOptions};
use crate::error::{ClientError, Result};
use crate::record::{
    NewSpecies, ObservationPayload, Question, QuestionKind, Species, SpeciesImage, SpeciesLog,
    Stats, User,
};
use log::{info, warn};
use reqwest::header::{ACCEPT, HeaderName, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

/// Photo bytes ready to be attached to a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoAttachment {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Decodes a response that may be bare or wrapped as `{"<envelope>": ...}`.
fn decode<T: DeserializeOwned>(data: Option<Value>, envelope: &str, path: &str) -> Result<T> {
    let value = data.ok_or_else(|| {
        ClientError::MalformedResponse(format!("{path} returned no JSON body"))
    })?;
    let inner = match value {
        Value::Object(mut map) if map.contains_key(envelope) => {
            map.remove(envelope).unwrap_or_default()
        }
        other => other,
    };
    serde_json::from_value(inner).map_err(|e| ClientError::MalformedResponse(format!("{path}: {e}")))
}

impl ApiClient {
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let data = self
            .request(
                "/login",
                RequestOptions::post_json(json!({"username": username, "password": password})),
            )
            .await?;
        decode(data, "login", "/login")
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        admin_secret: Option<&str>,
    ) -> Result<Option<Value>> {
        let mut options = RequestOptions::post_json(json!({
            "username": username,
            "email": email,
            "password": password,
        }));
        if let Some(secret) = admin_secret {
            let value = HeaderValue::from_str(secret).map_err(|_| {
                ClientError::Validation("Admin secret contains invalid characters".to_string())
            })?;
            options = options.with_header(HeaderName::from_static(ADMIN_SECRET_HEADER), value);
        }
        self.request("/register", options).await
    }

    pub async fn get_profile(&self) -> Result<User> {
        let data = self.request("/profile", RequestOptions::get()).await?;
        decode(data, "user", "/profile")
    }

    pub async fn get_stats(&self) -> Result<Stats> {
        let data = self.request("/stats", RequestOptions::get()).await?;
        decode(data, "stats", "/stats")
    }

    /// Profile and stats, fetched concurrently.
    pub async fn dashboard(&self) -> Result<(User, Stats)> {
        futures::try_join!(self.get_profile(), self.get_stats())
    }

    pub async fn get_species(&self) -> Result<Vec<Species>> {
        let data = self.request("/species", RequestOptions::get()).await?;
        decode(data, "species", "/species")
    }

    pub async fn create_species(&self, species: &NewSpecies) -> Result<Species> {
        let form = MultipartForm::new()
            .text("name", species.name.as_str())
            .text("scientific_name", species.scientific_name.as_str())
            .text("category", species.category.as_str())
            .text("description", species.description.as_str());
        let data = self
            .request("/species", RequestOptions::post_multipart(form))
            .await?;
        let created: Species = decode(data, "species", "/species")?;
        info!("Created species {} ({})", created.name, created.id);
        Ok(created)
    }

    pub async fn get_public_species_images(&self) -> Result<Vec<SpeciesImage>> {
        let data = self
            .request("/public/species-images", RequestOptions::get())
            .await?;
        decode(data, "species_images", "/public/species-images")
    }

    /// Species id to thumbnail path. Later entries win for duplicate ids.
    pub async fn species_thumbnails(&self) -> Result<HashMap<i64, String>> {
        Ok(self
            .get_public_species_images()
            .await?
            .into_iter()
            .map(|image| (image.species_id, image.photo_path))
            .collect())
    }

    pub async fn get_questions(&self) -> Result<Vec<Question>> {
        let data = self.request("/questions", RequestOptions::get()).await?;
        decode(data, "questions", "/questions")
    }

    /// Admin only.
    pub async fn create_question(&self, text: &str, kind: &QuestionKind) -> Result<Question> {
        let mut body = json!({
            "question_text": text,
            "question_type": kind.type_name(),
        });
        if let QuestionKind::MultipleChoice(options) = kind {
            body["options"] = json!(options);
        }
        let data = self
            .request("/questions", RequestOptions::post_json(body))
            .await?;
        decode(data, "question", "/questions")
    }

    /// Posts one observation. The returned log is `None` when the backend's
    /// confirmation does not describe the created record.
    pub async fn create_species_log(
        &self,
        observation: &ObservationPayload,
        photo: Option<PhotoAttachment>,
    ) -> Result<Option<SpeciesLog>> {
        let mut form = MultipartForm::new().text("species_log", serde_json::to_string(observation)?);
        if let Some(photo) = photo {
            form = form.file("photo", &photo.file_name, &photo.mime, photo.bytes);
        }
        let data = self
            .request("/species-logs", RequestOptions::post_multipart(form))
            .await?;
        match data {
            Some(value) => match decode::<SpeciesLog>(Some(value), "species_log", "/species-logs") {
                Ok(log) => Ok(Some(log)),
                Err(err) => {
                    warn!("Submission accepted but response was not a log record: {}", err);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn get_species_logs(&self) -> Result<Vec<SpeciesLog>> {
        let data = self.request("/species-logs", RequestOptions::get()).await?;
        decode(data, "species_logs", "/species-logs")
    }

    pub async fn get_species_log(&self, id: i64) -> Result<SpeciesLog> {
        let path = format!("/species-logs/{id}");
        let data = self.request(&path, RequestOptions::get()).await?;
        decode(data, "species_log", &path)
    }

    pub async fn get_all_users(&self) -> Result<Vec<User>> {
        let data = self.request("/admin/users", RequestOptions::get()).await?;
        decode(data, "users", "/admin/users")
    }

    pub async fn get_all_species_logs(&self) -> Result<Vec<SpeciesLog>> {
        let data = self.request("/admin/all-logs", RequestOptions::get()).await?;
        decode(data, "species_logs", "/admin/all-logs")
    }

    /// Downloads every log as raw CSV text. Admin only.
    pub async fn export_csv(&self) -> Result<String> {
        let options =
            RequestOptions::get().with_header(ACCEPT, HeaderValue::from_static("text/csv"));
        let response = self.send("/admin/export-csv", options).await?;
        let text = response.text();
        if !response.status.is_success() {
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| {
                    v.get("detail")
                        .or_else(|| v.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or(text);
            return Err(ClientError::RequestFailed {
                status: response.status.as_u16(),
                message: format!("Failed to export CSV: {detail}"),
            });
        }
        Ok(text)
    }
}
