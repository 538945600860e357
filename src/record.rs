use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// An authenticated session: the bearer token and the profile it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub total_logs: u64,
    #[serde(default)]
    pub unique_species: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Payload for an ad hoc species created from the details step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewSpecies {
    pub name: String,
    pub scientific_name: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesImage {
    pub species_id: i64,
    pub photo_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuestionKind {
    MultipleChoice(Vec<String>),
    Text,
    Number,
    YesNo,
}

impl QuestionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice(_) => "multiple_choice",
            QuestionKind::Text => "text",
            QuestionKind::Number => "number",
            QuestionKind::YesNo => "yes_no",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuestion", into = "RawQuestion")]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub kind: QuestionKind,
}

/// Wire shape of a question as the backend sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawQuestion {
    #[serde(default)]
    id: i64,
    #[serde(alias = "text")]
    question_text: String,
    question_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<String>>,
}

impl TryFrom<RawQuestion> for Question {
    type Error = String;

    fn try_from(raw: RawQuestion) -> Result<Self, Self::Error> {
        let kind = match raw.question_type.as_str() {
            "multiple_choice" => {
                let options = raw.options.unwrap_or_default();
                if options.is_empty() {
                    return Err(format!(
                        "multiple choice question {} has no options",
                        raw.id
                    ));
                }
                QuestionKind::MultipleChoice(options)
            }
            "text" => QuestionKind::Text,
            "number" => QuestionKind::Number,
            "yes_no" => QuestionKind::YesNo,
            other => return Err(format!("question {} has unknown type {other:?}", raw.id)),
        };
        Ok(Question {
            id: raw.id,
            text: raw.question_text,
            kind,
        })
    }
}

impl From<Question> for RawQuestion {
    fn from(question: Question) -> Self {
        let question_type = question.kind.type_name().to_string();
        let options = match question.kind {
            QuestionKind::MultipleChoice(options) => Some(options),
            _ => None,
        };
        RawQuestion {
            id: question.id,
            question_text: question.text,
            question_type,
            options,
        }
    }
}

impl Question {
    /// Checks that `value` has the shape this question expects and is not empty.
    pub fn accepts(&self, value: &AnswerValue) -> Result<(), ClientError> {
        if value.is_empty() {
            return Err(ClientError::Validation(format!(
                "Answer for question {} is empty",
                self.id
            )));
        }
        let fits = match (&self.kind, value) {
            (QuestionKind::MultipleChoice(options), AnswerValue::Text(choice)) => {
                options.iter().any(|option| option == choice)
            }
            (QuestionKind::Text, AnswerValue::Text(_)) => true,
            (QuestionKind::Number, AnswerValue::Number(_)) => true,
            (QuestionKind::YesNo, AnswerValue::YesNo(_)) => true,
            _ => false,
        };
        if fits {
            Ok(())
        } else {
            Err(ClientError::Validation(format!(
                "Answer {value} does not fit {} question {}",
                self.kind.type_name(),
                self.id
            )))
        }
    }

    /// Parses free-form user input into the answer shape this question takes.
    pub fn parse_answer(&self, raw: &str) -> Result<AnswerValue, ClientError> {
        let raw = raw.trim();
        let invalid = |expected: &str| {
            ClientError::Validation(format!(
                "Question {} expects {expected}, got {raw:?}",
                self.id
            ))
        };
        match &self.kind {
            QuestionKind::Text => Ok(AnswerValue::Text(raw.to_string())),
            QuestionKind::Number => {
                if let Ok(n) = raw.parse::<i64>() {
                    return Ok(AnswerValue::Number(Number::from(n)));
                }
                raw.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(AnswerValue::Number)
                    .ok_or_else(|| invalid("a number"))
            }
            QuestionKind::YesNo => match raw.to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" | "1" => Ok(AnswerValue::YesNo(true)),
                "no" | "n" | "false" | "0" => Ok(AnswerValue::YesNo(false)),
                _ => Err(invalid("yes or no")),
            },
            QuestionKind::MultipleChoice(options) => {
                if let Some(option) = options.iter().find(|o| o.eq_ignore_ascii_case(raw)) {
                    return Ok(AnswerValue::Text(option.clone()));
                }
                // 1-based index into the option list
                raw.parse::<usize>()
                    .ok()
                    .and_then(|i| i.checked_sub(1))
                    .and_then(|i| options.get(i))
                    .map(|o| AnswerValue::Text(o.clone()))
                    .ok_or_else(|| invalid(&format!("one of {}", options.join(", "))))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    YesNo(bool),
    Number(Number),
    Text(String),
}

impl AnswerValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, AnswerValue::Text(text) if text.trim().is_empty())
    }
}

impl std::fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerValue::YesNo(true) => write!(f, "yes"),
            AnswerValue::YesNo(false) => write!(f, "no"),
            AnswerValue::Number(n) => write!(f, "{n}"),
            AnswerValue::Text(text) => write!(f, "{text:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: i64,
    pub answer: AnswerValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// The JSON record sent in the `species_log` part of a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationPayload {
    pub species_id: i64,
    pub location_name: String,
    pub location_latitude: f64,
    pub location_longitude: f64,
    pub notes: String,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedAnswer {
    #[serde(default)]
    pub question_id: Option<i64>,
    #[serde(default)]
    pub question_text: Option<String>,
    #[serde(default, alias = "answer")]
    pub answer_text: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesLog {
    pub id: i64,
    #[serde(default)]
    pub species_id: Option<i64>,
    #[serde(default)]
    pub species_name: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default, alias = "location_latitude")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "location_longitude")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub answers: Vec<LoggedAnswer>,
}

/// Flat view of a species log for CSV output.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRow {
    pub id: i64,
    pub species: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notes: String,
    pub photo_path: String,
    pub created_at: String,
}

impl From<&SpeciesLog> for HistoryRow {
    fn from(log: &SpeciesLog) -> Self {
        Self {
            id: log.id,
            species: log.species_name.clone().unwrap_or_default(),
            location: log.location_name.clone().unwrap_or_default(),
            latitude: log.latitude,
            longitude: log.longitude,
            notes: log.notes.clone().unwrap_or_default(),
            photo_path: log.photo_path.clone().unwrap_or_default(),
            created_at: log.created_at.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(kind: QuestionKind) -> Question {
        Question {
            id: 3,
            text: "How many?".to_string(),
            kind,
        }
    }

    #[test]
    fn test_question_kinds_from_backend() {
        let questions: Vec<Question> = serde_json::from_value(json!([
            {"id": 1, "question_text": "Habitat?", "question_type": "multiple_choice",
             "options": ["Forest", "Wetland"]},
            {"id": 2, "question_text": "Behaviour", "question_type": "text"},
            {"id": 3, "question_text": "Count", "question_type": "number"},
            {"id": 4, "question_text": "Juvenile?", "question_type": "yes_no", "options": null},
        ]))
        .unwrap();

        assert_eq!(
            questions[0].kind,
            QuestionKind::MultipleChoice(vec!["Forest".to_string(), "Wetland".to_string()])
        );
        assert_eq!(questions[1].kind, QuestionKind::Text);
        assert_eq!(questions[2].kind, QuestionKind::Number);
        assert_eq!(questions[3].kind, QuestionKind::YesNo);
    }

    #[test]
    fn test_unknown_question_type_is_rejected() {
        let result: Result<Question, _> = serde_json::from_value(json!(
            {"id": 9, "question_text": "Sketch it", "question_type": "drawing"}
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_answer_per_kind() {
        assert_eq!(
            question(QuestionKind::Number).parse_answer(" 12 ").unwrap(),
            AnswerValue::Number(Number::from(12))
        );
        assert!(question(QuestionKind::Number).parse_answer("many").is_err());
        assert_eq!(
            question(QuestionKind::YesNo).parse_answer("Yes").unwrap(),
            AnswerValue::YesNo(true)
        );

        let choice = question(QuestionKind::MultipleChoice(vec![
            "Forest".to_string(),
            "Wetland".to_string(),
        ]));
        assert_eq!(
            choice.parse_answer("wetland").unwrap(),
            AnswerValue::Text("Wetland".to_string())
        );
        assert_eq!(
            choice.parse_answer("1").unwrap(),
            AnswerValue::Text("Forest".to_string())
        );
        assert!(choice.parse_answer("3").is_err());
    }

    #[test]
    fn test_accepts_rejects_mismatched_shapes() {
        let yes_no = question(QuestionKind::YesNo);
        assert!(yes_no.accepts(&AnswerValue::YesNo(false)).is_ok());
        assert!(yes_no.accepts(&AnswerValue::Text("yes".to_string())).is_err());

        let text = question(QuestionKind::Text);
        assert!(text.accepts(&AnswerValue::Text("   ".to_string())).is_err());

        let choice = question(QuestionKind::MultipleChoice(vec!["Forest".to_string()]));
        assert!(choice.accepts(&AnswerValue::Text("Desert".to_string())).is_err());
    }

    #[test]
    fn test_answer_serializes_with_native_value() {
        let answer = Answer {
            question_id: 7,
            answer: AnswerValue::YesNo(true),
        };
        assert_eq!(
            serde_json::to_value(&answer).unwrap(),
            json!({"question_id": 7, "answer": true})
        );
    }

    #[test]
    fn test_species_log_accepts_partial_records() {
        let log: SpeciesLog = serde_json::from_value(json!({
            "id": 4,
            "species_name": "Sparrow",
            "location_latitude": 51.5,
            "answers": [{"question_text": "Juvenile?", "answer_text": "true"}]
        }))
        .unwrap();
        assert_eq!(log.latitude, Some(51.5));
        assert_eq!(log.location_name, None);
        assert_eq!(log.answers.len(), 1);

        let row = HistoryRow::from(&log);
        assert_eq!(row.species, "Sparrow");
        assert_eq!(row.location, "");
    }
}
