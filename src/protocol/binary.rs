//! The `synopsebinary` wire encoding (spec §4.B, §6). A Binary frame
//! carrying `<head_token> 0x01 <payload_block>`, where `payload_block` is
//! a 0x01-separated field list, optionally LZ-compressed then AES-CFB
//! encrypted as a whole.

use crate::context::{HeadToken, RequestContext, ResponseContext, RestPayload, StatusCode};
use crate::error::Error;
use crate::frame::Frame;
use crate::protocol::crypto::CryptoContext;
use crate::protocol::{compress, RestCodec};
use std::collections::HashMap;

const SEP: u8 = 0x01;

pub struct BinaryCodec {
    pub compression: bool,
    pub encryption: Option<CryptoContext>,
}

fn join_fields(fields: Vec<Vec<u8>>) -> Vec<u8> {
    fields.join(&SEP)
}

fn split_fields(block: &[u8], n: usize) -> Result<Vec<Vec<u8>>, Error> {
    let parts: Vec<Vec<u8>> = block.splitn(n, |&b| b == SEP).map(|s| s.to_vec()).collect();
    if parts.len() != n {
        return Err(Error::MalformedBinaryPayload("0x01 field separator"));
    }
    Ok(parts)
}

impl BinaryCodec {
    fn seal(&self, mut block: Vec<u8>) -> Result<Vec<u8>, Error> {
        if self.compression {
            block = compress::compress(&block);
        }
        if let Some(ctx) = &self.encryption {
            block = ctx.encrypt(&block)?;
        }
        Ok(block)
    }

    fn unseal(&self, mut block: Vec<u8>) -> Result<Vec<u8>, Error> {
        if let Some(ctx) = &self.encryption {
            block = ctx.decrypt(&block)?;
        }
        if self.compression {
            block = compress::decompress(&block)?;
        }
        Ok(block)
    }

    fn frame_with_head(&self, head: HeadToken, block: Vec<u8>) -> Result<Frame, Error> {
        let sealed = self.seal(block)?;
        let mut out = Vec::with_capacity(head.as_str().len() + 1 + sealed.len());
        out.extend_from_slice(head.as_str().as_bytes());
        out.push(SEP);
        out.extend_from_slice(&sealed);
        Ok(Frame::new(crate::frame::OpCode::Binary, out))
    }
}

impl RestCodec for BinaryCodec {
    fn encode_request(&self, req: &RequestContext) -> Result<Frame, Error> {
        let block = join_fields(vec![
            req.method.as_bytes().to_vec(),
            req.url.as_bytes().to_vec(),
            serde_json::to_vec(&req.headers)?,
            if req.no_answer { b"1".to_vec() } else { b"0".to_vec() },
            req.content_type.as_bytes().to_vec(),
            req.body.clone(),
        ]);
        self.frame_with_head(HeadToken::Request, block)
    }

    fn encode_answer(&self, resp: &ResponseContext) -> Result<Frame, Error> {
        let block = join_fields(vec![
            resp.status.text().into_bytes(),
            serde_json::to_vec(&resp.headers)?,
            resp.content_type.as_bytes().to_vec(),
            resp.body.clone(),
        ]);
        self.frame_with_head(HeadToken::Answer, block)
    }

    fn decode(&self, frame: &Frame, expect: HeadToken) -> Result<Option<RestPayload>, Error> {
        let pos = frame
            .payload
            .iter()
            .position(|&b| b == SEP)
            .ok_or(Error::MalformedBinaryPayload("head token"))?;
        let head_str = String::from_utf8(frame.payload[..pos].to_vec())?;
        let head = match HeadToken::parse(&head_str) {
            Some(head) => head,
            None => return Ok(None),
        };
        if head != expect {
            return Ok(None);
        }

        let block = self.unseal(frame.payload[pos + 1..].to_vec())?;

        match head {
            HeadToken::Request => {
                let parts = split_fields(&block, 6)?;
                let method = String::from_utf8(parts[0].clone())?;
                let url = String::from_utf8(parts[1].clone())?;
                let headers: HashMap<String, String> = serde_json::from_slice(&parts[2])?;
                let no_answer = parts[3] == b"1";
                let content_type = String::from_utf8(parts[4].clone())?;
                let body = parts[5].clone();
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
                let parts = split_fields(&block, 4)?;
                let status = String::from_utf8(parts[0].clone())?
                    .parse::<u16>()
                    .map(StatusCode)
                    .unwrap_or(StatusCode::NOT_FOUND);
                let headers: HashMap<String, String> = serde_json::from_slice(&parts[1])?;
                let content_type = String::from_utf8(parts[2].clone())?;
                let body = parts[3].clone();
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

    fn codec(compression: bool, encryption: Option<CryptoContext>) -> BinaryCodec {
        BinaryCodec {
            compression,
            encryption,
        }
    }

    #[test]
    fn roundtrip_plain() {
        let c = codec(false, None);
        let req = RequestContext::new("GET", "/a").with_body("text/plain", b"hi".to_vec());
        let frame = c.encode_request(&req).unwrap();
        let decoded = c.decode(&frame, HeadToken::Request).unwrap().unwrap();
        match decoded {
            RestPayload::Request(got) => assert_eq!(got.body, b"hi"),
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn roundtrip_compressed() {
        let c = codec(true, None);
        let req = RequestContext::new("POST", "/big").with_body("application/octet-stream", vec![7u8; 4096]);
        let frame = c.encode_request(&req).unwrap();
        let decoded = c.decode(&frame, HeadToken::Request).unwrap().unwrap();
        match decoded {
            RestPayload::Request(got) => assert_eq!(got.body, vec![7u8; 4096]),
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn roundtrip_encrypted() {
        let ctx = CryptoContext::from_text("shared-secret");
        let c = codec(false, Some(ctx));
        let req = RequestContext::new("DELETE", "/secure").with_body("text/plain", b"classified".to_vec());
        let frame = c.encode_request(&req).unwrap();
        assert!(!frame.payload.windows(10).any(|w| w == b"classified"));
        let decoded = c.decode(&frame, HeadToken::Request).unwrap().unwrap();
        match decoded {
            RestPayload::Request(got) => assert_eq!(got.body, b"classified"),
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn roundtrip_compressed_and_encrypted() {
        let ctx = CryptoContext::from_text("another-secret");
        let c = codec(true, Some(ctx));
        let resp = ResponseContext::new(StatusCode::OK).with_body("text/plain", vec![b'z'; 8192]);
        let frame = c.encode_answer(&resp).unwrap();
        let decoded = c.decode(&frame, HeadToken::Answer).unwrap().unwrap();
        match decoded {
            RestPayload::Answer(got) => assert_eq!(got.body, vec![b'z'; 8192]),
            _ => panic!("expected an answer"),
        }
    }

    #[test]
    fn mismatched_head_token_is_silently_dropped() {
        let c = codec(false, None);
        let resp = ResponseContext::new(StatusCode::OK);
        let frame = c.encode_answer(&resp).unwrap();
        assert!(c.decode(&frame, HeadToken::Request).unwrap().is_none());
    }

    #[test]
    fn malformed_payload_without_separator_errors() {
        let c = codec(false, None);
        let frame = Frame::new(crate::frame::OpCode::Binary, b"garbage".to_vec());
        assert!(c.decode(&frame, HeadToken::Request).is_err());
    }
}
