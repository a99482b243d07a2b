use serde::{Deserialize, Serialize};

/// Quiz document as stored in the `quizzes` collection. Only the fields the
/// engine reads; content authoring lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub subject: Option<String>,
    pub chapter: Option<String>,
    pub grade: Option<String>,
    #[serde(default)]
    pub questions: Vec<serde_json::Value>,
}

impl QuizDocument {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }
}

/// Subject/chapter/grade triple served by the metadata provider. Absent
/// metadata is reported as `None` and rolled up as "unknown" downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizInfo {
    pub subject: Option<String>,
    pub chapter: Option<String>,
    pub grade: Option<String>,
}

impl From<&QuizDocument> for QuizInfo {
    fn from(doc: &QuizDocument) -> Self {
        Self {
            subject: doc.subject.clone(),
            chapter: doc.chapter.clone(),
            grade: doc.grade.clone(),
        }
    }
}
