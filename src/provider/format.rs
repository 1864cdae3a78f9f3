//! OpenAI-compatible batch JSONL schema.
//!
//! Request line:
//!
//! ```json
//! {"custom_id": "…", "method": "POST", "url": "/v1/chat/completions",
//!  "body": {"model": "…", "max_tokens": 2000,
//!           "messages": [{"role": "user", "content": [
//!              {"type": "text", "text": "<prompt>"},
//!              {"type": "image_url", "image_url": {"url": "data:image/png;base64,…"}}]}]}}
//! ```
//!
//! Output line:
//!
//! ```json
//! {"id": "…", "custom_id": "…",
//!  "response": {"status_code": 200, "body": {"choices": [{"message": {"content": "…"}}]}},
//!  "error": null}
//! ```

use super::{LineOptions, OutputRecord, RecordOutcome};
use crate::error::ProviderError;
use crate::pipeline::encode::BatchRequestRecord;
use serde::{Deserialize, Serialize};

/// Chat completions endpoint on api.openai.com.
pub const DEFAULT_ENDPOINT: &str = "/v1/chat/completions";

/// Chat completions endpoint as Azure OpenAI names it in batch lines.
pub const AZURE_ENDPOINT: &str = "/chat/completions";

#[derive(Debug, Serialize)]
struct RequestLine<'a> {
    custom_id: &'a str,
    method: &'static str,
    url: &'a str,
    body: ChatBody<'a>,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [UserMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: [ContentPart<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

/// Serialize one record into a request line.
pub fn encode_line(
    record: &BatchRequestRecord,
    options: &LineOptions,
) -> Result<String, ProviderError> {
    let line = RequestLine {
        custom_id: &record.custom_id,
        method: "POST",
        url: &options.endpoint,
        body: ChatBody {
            model: &options.model,
            messages: [UserMessage {
                role: "user",
                content: [
                    ContentPart::Text {
                        text: &record.prompt,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: &record.image_payload,
                        },
                    },
                ],
            }],
            max_tokens: options.max_tokens,
        },
    };
    serde_json::to_string(&line)
        .map_err(|e| ProviderError::new(format!("Error serializing batch line: {e}")))
}

#[derive(Debug, Deserialize)]
struct ResponseLine {
    custom_id: String,
    #[serde(default)]
    response: Option<ResponseEnvelope>,
    #[serde(default)]
    error: Option<LineError>,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    status_code: u16,
    #[serde(default)]
    body: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct LineError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Parse one output or error line.
///
/// A line that parses but carries an error (or a non-2xx status) decodes to
/// [`RecordOutcome::Failed`]; only lines that are not records at all are `Err`.
pub fn decode_line(line: &str) -> Result<OutputRecord, String> {
    let parsed: ResponseLine =
        serde_json::from_str(line).map_err(|e| format!("invalid JSON record: {e}"))?;

    let outcome = match (parsed.error, parsed.response) {
        (Some(err), _) => RecordOutcome::Failed(format!(
            "{}: {}",
            err.code.as_deref().unwrap_or("error"),
            err.message.as_deref().unwrap_or("no message")
        )),
        (None, None) => RecordOutcome::Failed("record has neither response nor error".into()),
        (None, Some(resp)) if !(200..300).contains(&resp.status_code) => {
            let message = resp
                .body
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("no message");
            RecordOutcome::Failed(format!("HTTP {}: {}", resp.status_code, message))
        }
        (None, Some(resp)) => match serde_json::from_value::<ChatCompletion>(resp.body) {
            Ok(completion) => match completion.choices.into_iter().next() {
                Some(choice) => RecordOutcome::Content(choice.message.content.unwrap_or_default()),
                None => RecordOutcome::Failed("response has no choices".into()),
            },
            Err(e) => RecordOutcome::Failed(format!("unexpected response body: {e}")),
        },
    };

    Ok(OutputRecord {
        custom_id: parsed.custom_id,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> LineOptions {
        LineOptions {
            model: "gpt-4o".into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            max_tokens: 2000,
        }
    }

    #[test]
    fn encode_line_shape() {
        let record = BatchRequestRecord {
            custom_id: "abc--page--1".into(),
            prompt: "Convert this page".into(),
            image_payload: "data:image/png;base64,AAAA".into(),
        };
        let line = encode_line(&record, &options()).unwrap();
        assert!(!line.contains('\n'));

        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["custom_id"], "abc--page--1");
        assert_eq!(v["method"], "POST");
        assert_eq!(v["url"], "/v1/chat/completions");
        assert_eq!(v["body"]["model"], "gpt-4o");
        assert_eq!(v["body"]["max_tokens"], 2000);
        let content = &v["body"]["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "Convert this page");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn decode_successful_line() {
        let line = r##"{"id":"r1","custom_id":"c1","response":{"status_code":200,"request_id":"x","body":{"choices":[{"index":0,"message":{"role":"assistant","content":"# Title"}}]}},"error":null}"##;
        let rec = decode_line(line).unwrap();
        assert_eq!(rec.custom_id, "c1");
        assert_eq!(rec.outcome, RecordOutcome::Content("# Title".into()));
    }

    #[test]
    fn decode_null_content_is_empty_page() {
        let line = r#"{"custom_id":"c1","response":{"status_code":200,"body":{"choices":[{"message":{"content":null}}]}}}"#;
        assert_eq!(
            decode_line(line).unwrap().outcome,
            RecordOutcome::Content(String::new())
        );
    }

    #[test]
    fn decode_error_line() {
        let line = r#"{"custom_id":"c2","response":null,"error":{"code":"invalid_image","message":"could not decode"}}"#;
        let rec = decode_line(line).unwrap();
        assert_eq!(
            rec.outcome,
            RecordOutcome::Failed("invalid_image: could not decode".into())
        );
    }

    #[test]
    fn decode_non_2xx_response() {
        let line = r#"{"custom_id":"c3","response":{"status_code":429,"body":{"error":{"message":"rate limited"}}},"error":null}"#;
        let rec = decode_line(line).unwrap();
        assert_eq!(
            rec.outcome,
            RecordOutcome::Failed("HTTP 429: rate limited".into())
        );
    }

    #[test]
    fn decode_garbage_is_err() {
        assert!(decode_line("not json").is_err());
        assert!(decode_line(r#"{"no_custom_id":true}"#).is_err());
    }
}
