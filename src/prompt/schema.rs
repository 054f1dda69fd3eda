//! Structured-output schemas sent alongside JSON prompts, in the
//! `responseSchema` dialect the generation service understands.

use serde_json::{json, Value};

fn string() -> Value {
    json!({ "type": "STRING" })
}

/// Shape of [`crate::report::types::AnalysisResult`] minus the build extensions.
pub fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "conceptualAnalysis": {
                "type": "OBJECT",
                "properties": {
                    "title": string(),
                    "description": string()
                },
                "required": ["title", "description"]
            },
            "improvementSuggestions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "category": string(),
                        "suggestions": { "type": "ARRAY", "items": string() }
                    },
                    "required": ["category", "suggestions"]
                }
            },
            "updatePlan": {
                "type": "OBJECT",
                "properties": {
                    "title": string(),
                    "tasks": {
                        "type": "ARRAY",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "id": string(),
                                "title": string(),
                                "description": string(),
                                "relatedSuggestionCategory": string()
                            },
                            "required": ["id", "title", "description", "relatedSuggestionCategory"]
                        }
                    }
                },
                "required": ["title", "tasks"]
            }
        },
        "required": ["conceptualAnalysis", "improvementSuggestions", "updatePlan"]
    })
}

/// Shape of [`crate::report::types::ProposedChanges`].
pub fn code_change_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": string(),
            "changes": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "filePath": string(),
                        "status": {
                            "type": "STRING",
                            "enum": ["created", "modified", "deleted"]
                        },
                        "content": string()
                    },
                    "required": ["filePath", "status", "content"]
                }
            }
        },
        "required": ["summary", "changes"]
    })
}
