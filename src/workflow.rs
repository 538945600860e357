use crate::api::PhotoAttachment;
use crate::client::ApiClient;
use crate::error::{ClientError, Result};
use crate::location::GeoFix;
use crate::record::{
    Answer, AnswerValue, Location, NewSpecies, ObservationPayload, Question, Species, SpeciesLog,
};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DEFAULT_PHOTO_NAME: &str = "photo.jpg";
const DEFAULT_PHOTO_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq)]
pub enum SpeciesChoice {
    Existing(Option<i64>),
    New(NewSpecies),
}

impl Default for SpeciesChoice {
    fn default() -> Self {
        SpeciesChoice::Existing(None)
    }
}

/// A photo on local storage, read when the observation is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRef {
    pub path: PathBuf,
    pub file_name: Option<String>,
    pub mime: Option<String>,
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("heic") => "image/heic",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => DEFAULT_PHOTO_MIME,
    }
}

impl PhotoRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_name: None,
            mime: None,
        }
    }

    pub async fn load(&self) -> Result<PhotoAttachment> {
        let bytes = tokio::fs::read(&self.path).await?;
        let file_name = self
            .file_name
            .clone()
            .or_else(|| {
                self.path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_PHOTO_NAME.to_string());
        let mime = self
            .mime
            .clone()
            .unwrap_or_else(|| mime_for(&self.path).to_string());
        Ok(PhotoAttachment {
            file_name,
            mime,
            bytes,
        })
    }
}

/// What the user has typed into the details step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailsForm {
    pub species: SpeciesChoice,
    pub location_name: String,
    pub latitude: String,
    pub longitude: String,
    pub notes: String,
    pub photo: Option<PhotoRef>,
}

/// Absent or unparsable coordinates read as 0.
fn parse_coordinate(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn missing(field: &str) -> ClientError {
    ClientError::Validation(format!("{field} is required"))
}

impl DetailsForm {
    pub fn apply_fix(&mut self, fix: GeoFix) {
        self.latitude = fix.latitude.to_string();
        self.longitude = fix.longitude.to_string();
    }

    pub fn validate(&self) -> Result<()> {
        if self.location_name.trim().is_empty() {
            return Err(missing("Location name"));
        }
        match &self.species {
            SpeciesChoice::Existing(None) => Err(ClientError::Validation(
                "Select an existing species or add a new one".to_string(),
            )),
            SpeciesChoice::Existing(Some(_)) => Ok(()),
            SpeciesChoice::New(species) => {
                if species.name.trim().is_empty() {
                    return Err(missing("New species common name"));
                }
                if species.category.trim().is_empty() {
                    return Err(missing("New species category"));
                }
                Ok(())
            }
        }
    }

    fn location(&self) -> Location {
        Location {
            name: self.location_name.trim().to_string(),
            latitude: parse_coordinate(&self.latitude),
            longitude: parse_coordinate(&self.longitude),
        }
    }
}

/// Output of the details step, with the species resolved to an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationDetails {
    pub species_id: i64,
    pub created_species: Option<Species>,
    pub location: Location,
    pub notes: String,
    pub photo: Option<PhotoRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftObservation {
    pub details: ObservationDetails,
    pub answers: BTreeMap<i64, AnswerValue>,
}

impl DraftObservation {
    /// The JSON record for submission, answers ordered as the questions are.
    pub fn payload(&self, questions: &[Question]) -> ObservationPayload {
        let answers = questions
            .iter()
            .filter_map(|question| {
                self.answers.get(&question.id).map(|value| Answer {
                    question_id: question.id,
                    answer: value.clone(),
                })
            })
            .collect();
        ObservationPayload {
            species_id: self.details.species_id,
            location_name: self.details.location.name.clone(),
            location_latitude: self.details.location.latitude,
            location_longitude: self.details.location.longitude,
            notes: self.details.notes.clone(),
            answers,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Details(DetailsForm),
    Questions {
        form: DetailsForm,
        draft: DraftObservation,
    },
}

/// Two-step observation wizard: species details, then the questionnaire.
#[derive(Debug, Clone)]
pub struct SubmissionFlow {
    questions: Vec<Question>,
    state: FlowState,
}

impl SubmissionFlow {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions,
            state: FlowState::Details(DetailsForm::default()),
        }
    }

    /// Fetches the question set once and starts at an empty details form.
    pub async fn load(client: &ApiClient) -> Result<Self> {
        let questions = client.get_questions().await?;
        info!("Loaded {} questions", questions.len());
        Ok(Self::new(questions))
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn details_form(&self) -> Option<&DetailsForm> {
        match &self.state {
            FlowState::Details(form) => Some(form),
            FlowState::Questions { .. } => None,
        }
    }

    pub fn details_form_mut(&mut self) -> Option<&mut DetailsForm> {
        match &mut self.state {
            FlowState::Details(form) => Some(form),
            FlowState::Questions { .. } => None,
        }
    }

    pub fn draft(&self) -> Option<&DraftObservation> {
        match &self.state {
            FlowState::Questions { draft, .. } => Some(draft),
            FlowState::Details(_) => None,
        }
    }

    /// Validates the details form and resolves the species, creating it on
    /// the backend first when the user chose a new one.
    pub async fn submit_details(&mut self, client: &ApiClient) -> Result<ObservationDetails> {
        let FlowState::Details(form) = &self.state else {
            return Err(ClientError::Validation(
                "Species details were already submitted".to_string(),
            ));
        };
        form.validate()?;
        let form = form.clone();

        let (species_id, created_species) = match &form.species {
            SpeciesChoice::Existing(Some(id)) => (*id, None),
            SpeciesChoice::Existing(None) => {
                return Err(missing("Species"));
            }
            SpeciesChoice::New(new_species) => {
                let species = client
                    .create_species(new_species)
                    .await
                    .map_err(|err| ClientError::SpeciesCreationFailed(Box::new(err)))?;
                (species.id, Some(species))
            }
        };

        let details = ObservationDetails {
            species_id,
            created_species,
            location: form.location(),
            notes: form.notes.clone(),
            photo: form.photo.clone(),
        };
        self.state = FlowState::Questions {
            form,
            draft: DraftObservation {
                details: details.clone(),
                answers: BTreeMap::new(),
            },
        };
        Ok(details)
    }

    pub fn answer(&mut self, question_id: i64, value: AnswerValue) -> Result<()> {
        let question = self
            .questions
            .iter()
            .find(|question| question.id == question_id)
            .ok_or_else(|| ClientError::Validation(format!("Unknown question {question_id}")))?;
        question.accepts(&value)?;
        let FlowState::Questions { draft, .. } = &mut self.state else {
            return Err(ClientError::Validation(
                "Submit species details before answering questions".to_string(),
            ));
        };
        draft.answers.insert(question_id, value);
        Ok(())
    }

    /// Parses `raw` according to the question's kind and records it.
    pub fn answer_raw(&mut self, question_id: i64, raw: &str) -> Result<()> {
        let value = self
            .questions
            .iter()
            .find(|question| question.id == question_id)
            .ok_or_else(|| ClientError::Validation(format!("Unknown question {question_id}")))?
            .parse_answer(raw)?;
        self.answer(question_id, value)
    }

    /// Questions still lacking a usable answer.
    pub fn unanswered(&self) -> Vec<&Question> {
        let answers = self.draft().map(|draft| &draft.answers);
        self.questions
            .iter()
            .filter(|question| {
                !answers
                    .and_then(|answers| answers.get(&question.id))
                    .is_some_and(|value| !value.is_empty())
            })
            .collect()
    }

    /// Returns to the details step, dropping answers but keeping the details.
    pub fn back(&mut self) -> bool {
        let state = std::mem::replace(&mut self.state, FlowState::Details(DetailsForm::default()));
        match state {
            FlowState::Questions { mut form, draft } => {
                if let Some(species) = draft.details.created_species {
                    form.species = SpeciesChoice::Existing(Some(species.id));
                }
                self.state = FlowState::Details(form);
                true
            }
            details => {
                self.state = details;
                false
            }
        }
    }

    /// Discards everything captured so far.
    pub fn cancel(&mut self) {
        self.state = FlowState::Details(DetailsForm::default());
    }

    /// Sends the observation. On failure the draft is kept for a retry; on
    /// success the flow restarts with an empty form.
    pub async fn submit(&mut self, client: &ApiClient) -> Result<Option<SpeciesLog>> {
        let FlowState::Questions { draft, .. } = &self.state else {
            return Err(ClientError::Validation(
                "Species details must be submitted first".to_string(),
            ));
        };
        let unanswered: Vec<String> = self
            .unanswered()
            .iter()
            .map(|question| question.id.to_string())
            .collect();
        if !unanswered.is_empty() {
            return Err(ClientError::Validation(format!(
                "Please answer all questions (missing: {})",
                unanswered.join(", ")
            )));
        }

        let payload = draft.payload(&self.questions);
        let photo = match &draft.details.photo {
            Some(photo) => Some(photo.load().await?),
            None => None,
        };

        let log = match client.create_species_log(&payload, photo).await {
            Ok(log) => log,
            Err(err) => {
                warn!("Observation submission failed: {}", err);
                return Err(ClientError::SubmissionFailed(Box::new(err)));
            }
        };
        info!(
            "Submitted observation of species {} at {}",
            payload.species_id, payload.location_name
        );
        self.cancel();
        Ok(log)
    }
}
