//! The `synopsejson` wire encoding (spec §4.B, §6). A Text frame carrying
//! `{"<head>":[...]}` where `<head>` is `"request"` or `"answer"`.

use crate::context::{HeadToken, RequestContext, ResponseContext, RestPayload};
use crate::error::Error;
use crate::frame::Frame;
use crate::protocol::RestCodec;
use serde_json::{json, Value};
use std::collections::HashMap;

const APPLICATION_JSON: &str = "application/json";
const BASE64_MARKER: &str = "base64:";

pub struct JsonCodec;

fn encode_body(content_type: &str, body: &[u8]) -> Result<Value, Error> {
    if body.is_empty() {
        return Ok(Value::String(String::new()));
    }

    if content_type.is_empty() || content_type.eq_ignore_ascii_case(APPLICATION_JSON) {
        let parsed: Value = serde_json::from_slice(body)?;
        Ok(parsed)
    } else if content_type.starts_with("text/") {
        Ok(Value::String(String::from_utf8(body.to_vec())?))
    } else {
        use base64::prelude::*;
        Ok(Value::String(format!(
            "{BASE64_MARKER}{}",
            BASE64_STANDARD.encode(body)
        )))
    }
}

fn decode_body(content_type: &str, value: &Value) -> Result<Vec<u8>, Error> {
    if let Value::String(s) = value {
        if s.is_empty() {
            return Ok(Vec::new());
        }
    }

    if content_type.is_empty() || content_type.eq_ignore_ascii_case(APPLICATION_JSON) {
        Ok(serde_json::to_vec(value)?)
    } else if content_type.starts_with("text/") {
        let s = value
            .as_str()
            .ok_or_else(|| Error::MalformedBinaryPayload("expected text body"))?;
        Ok(s.as_bytes().to_vec())
    } else {
        let s = value
            .as_str()
            .ok_or_else(|| Error::MalformedBinaryPayload("expected base64 body"))?;
        let stripped = s
            .strip_prefix(BASE64_MARKER)
            .ok_or_else(|| Error::MalformedBinaryPayload("missing base64 marker"))?;
        use base64::prelude::*;
        Ok(BASE64_STANDARD.decode(stripped).map_err(|e| {
            Error::EncryptionError(format!("invalid base64 body: {e}"))
        })?)
    }
}

impl RestCodec for JsonCodec {
    fn encode_request(&self, req: &RequestContext) -> Result<Frame, Error> {
        let headers_json = serde_json::to_string(&req.headers)?;
        let body_value = encode_body(&req.content_type, &req.body)?;
        let no_answer = if req.no_answer { "1" } else { "0" };
        let array = json!([
            req.method,
            req.url,
            headers_json,
            no_answer,
            req.content_type,
            body_value
        ]);
        let envelope = json!({ HeadToken::Request.as_str(): array });
        Frame::text(serde_json::to_vec(&envelope)?)
    }

    fn encode_answer(&self, resp: &ResponseContext) -> Result<Frame, Error> {
        let headers_json = serde_json::to_string(&resp.headers)?;
        let body_value = encode_body(&resp.content_type, &resp.body)?;
        let array = json!([
            resp.status.text(),
            headers_json,
            resp.content_type,
            body_value
        ]);
        let envelope = json!({ HeadToken::Answer.as_str(): array });
        Frame::text(serde_json::to_vec(&envelope)?)
    }

    fn decode(&self, frame: &Frame, expect: HeadToken) -> Result<Option<RestPayload>, Error> {
        let text = String::from_utf8(frame.payload.clone())?;
        let value: Value = serde_json::from_str(&text)?;
        let obj = value
            .as_object()
            .ok_or_else(|| Error::MalformedBinaryPayload("expected a JSON object envelope"))?;
        let (key, array) = obj
            .iter()
            .next()
            .ok_or_else(|| Error::MalformedBinaryPayload("empty JSON envelope"))?;

        let head = match HeadToken::parse(key) {
            Some(head) => head,
            None => return Ok(None),
        };
        if head != expect {
            return Ok(None);
        }

        let array = array
            .as_array()
            .ok_or_else(|| Error::MalformedBinaryPayload("expected a JSON array value"))?;

        match head {
            HeadToken::Request => {
                if array.len() != 6 {
                    return Err(Error::MalformedBinaryPayload("expected 6 request fields"));
                }
                let method = array[0].as_str().unwrap_or_default().to_string();
                let url = array[1].as_str().unwrap_or_default().to_string();
                let headers: HashMap<String, String> =
                    serde_json::from_str(array[2].as_str().unwrap_or("{}"))?;
                let no_answer = array[3].as_str().unwrap_or("0") == "1";
                let content_type = array[4].as_str().unwrap_or_default().to_string();
                let body = decode_body(&content_type, &array[5])?;
                Ok(Some(RestPayload::Request(RequestContext {
                    method,
                    url,
                    headers,
                    body,
                    content_type,
                    no_answer,
                })))
            }
            HeadToken::Answer => {
                if array.len() != 4 {
                    return Err(Error::MalformedBinaryPayload("expected 4 answer fields"));
                }
                let status = array[0]
                    .as_str()
                    .and_then(|s| s.parse::<u16>().ok())
                    .map(crate::context::StatusCode)
                    .unwrap_or(crate::context::StatusCode::NOT_FOUND);
                let headers: HashMap<String, String> =
                    serde_json::from_str(array[1].as_str().unwrap_or("{}"))?;
                let content_type = array[2].as_str().unwrap_or_default().to_string();
                let body = decode_body(&content_type, &array[3])?;
                Ok(Some(RestPayload::Answer(ResponseContext {
                    status,
                    headers,
                    body,
                    content_type,
                })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StatusCode;

    #[test]
    fn roundtrip_request_json_body() {
        let codec = JsonCodec;
        let req = RequestContext::new("GET", "/x")
            .with_body(APPLICATION_JSON, br#"{"a":1}"#.to_vec());
        let frame = codec.encode_request(&req).unwrap();
        let decoded = codec.decode(&frame, HeadToken::Request).unwrap().unwrap();
        match decoded {
            RestPayload::Request(got) => {
                assert_eq!(got.method, "GET");
                assert_eq!(got.url, "/x");
                let expected: Value = serde_json::from_slice(&req.body).unwrap();
                let actual: Value = serde_json::from_slice(&got.body).unwrap();
                assert_eq!(expected, actual);
            }
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn roundtrip_text_body() {
        let codec = JsonCodec;
        let req = RequestContext::new("POST", "/t").with_body("text/plain", b"hello there".to_vec());
        let frame = codec.encode_request(&req).unwrap();
        let decoded = codec.decode(&frame, HeadToken::Request).unwrap().unwrap();
        match decoded {
            RestPayload::Request(got) => assert_eq!(got.body, b"hello there"),
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn roundtrip_binary_body_base64() {
        let codec = JsonCodec;
        let req = RequestContext::new("POST", "/b")
            .with_body("application/octet-stream", vec![0, 1, 2, 255, 254]);
        let frame = codec.encode_request(&req).unwrap();
        let decoded = codec.decode(&frame, HeadToken::Request).unwrap().unwrap();
        match decoded {
            RestPayload::Request(got) => assert_eq!(got.body, vec![0, 1, 2, 255, 254]),
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn roundtrip_empty_body() {
        let codec = JsonCodec;
        let req = RequestContext::new("GET", "/empty");
        let frame = codec.encode_request(&req).unwrap();
        let decoded = codec.decode(&frame, HeadToken::Request).unwrap().unwrap();
        match decoded {
            RestPayload::Request(got) => assert!(got.body.is_empty()),
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn mismatched_head_token_is_silently_dropped() {
        let codec = JsonCodec;
        let resp = ResponseContext::new(StatusCode::OK);
        let frame = codec.encode_answer(&resp).unwrap();
        let decoded = codec.decode(&frame, HeadToken::Request).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn roundtrip_answer() {
        let codec = JsonCodec;
        let resp = ResponseContext::new(StatusCode::CREATED).with_body("text/plain", b"ok".to_vec());
        let frame = codec.encode_answer(&resp).unwrap();
        let decoded = codec.decode(&frame, HeadToken::Answer).unwrap().unwrap();
        match decoded {
            RestPayload::Answer(got) => {
                assert_eq!(got.status.0, 201);
                assert_eq!(got.body, b"ok");
            }
            _ => panic!("expected an answer"),
        }
    }
}
