//! RFC 822 / MIME encoding and a tolerant parser.
//!
//! Messages are built with `lettre`: `multipart/mixed` when they carry
//! attachments and a single text part otherwise, every body part base64
//! encoded. The parser is separate and accepts CRLF or LF line endings,
//! folded headers, RFC 2047 encoded words, RFC 2231 parameters, base64 /
//! quoted-printable / 7bit / 8bit parts and nested multiparts, which are
//! flattened into one body plus a list of attachments.

use std::collections::HashMap;
use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{DateTime, Utc};
use lettre::address::Envelope;
use lettre::message::header::{
    self, ContentDisposition, ContentId, ContentTransferEncoding, ContentType, Header, HeaderName, HeaderValue,
};
use lettre::message::{Mailbox, Mailboxes, MultiPart, SinglePart};
use lettre::Message;
use uuid::Uuid;

use super::address::{parse_address_list, sanitize_display_name, EmailAddress};
use super::attachment::EmailAttachment;
use super::{SimplifiedEmailMessage, ENCRYPTION_HEADER, ENCRYPTION_HEADER_VALUE};
use crate::error::{EmailError, Result};

/// Encode/parse between [`SimplifiedEmailMessage`] and RFC 822 bytes.
pub trait Rfc822Codec: Send + Sync {
    fn encode(&self, message: &SimplifiedEmailMessage) -> Result<Vec<u8>>;
    fn decode(&self, data: &[u8]) -> Result<SimplifiedEmailMessage>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MimeCodec;

impl Rfc822Codec for MimeCodec {
    fn encode(&self, message: &SimplifiedEmailMessage) -> Result<Vec<u8>> {
        encode_message(message)
    }

    fn decode(&self, data: &[u8]) -> Result<SimplifiedEmailMessage> {
        decode_message(data)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// `X-Sudoplatform-Encryption: sudoplatform`
#[derive(Clone, Debug, PartialEq, Eq)]
struct SudoplatformEncryption;

impl Header for SudoplatformEncryption {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str(ENCRYPTION_HEADER)
    }

    fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        if s.trim().eq_ignore_ascii_case(ENCRYPTION_HEADER_VALUE) {
            Ok(Self)
        } else {
            Err(format!("unexpected {} value {:?}", ENCRYPTION_HEADER, s).into())
        }
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), ENCRYPTION_HEADER_VALUE.to_string())
    }
}

fn encode_message(m: &SimplifiedEmailMessage) -> Result<Vec<u8>> {
    let from = mailboxes(&m.from)?;
    let to = mailboxes(&m.to)?;
    let cc = mailboxes(&m.cc)?;
    let bcc = mailboxes(&m.bcc)?;
    let reply_to = mailboxes(&m.reply_to)?;

    // Only SMTP transports read the envelope. Drafts may have no recipients
    // yet, so fall back to the senders.
    let mut envelope_to: Vec<_> = to
        .iter()
        .chain(cc.iter())
        .chain(bcc.iter())
        .map(|mb| mb.email.clone())
        .collect();
    if envelope_to.is_empty() {
        envelope_to = from.iter().map(|mb| mb.email.clone()).collect();
    }
    let envelope = Envelope::new(None, envelope_to).map_err(build_error)?;

    let message_id = m
        .message_id
        .clone()
        .unwrap_or_else(|| format!("<{}@sudomail.com>", Uuid::new_v4()));
    let mut builder = Message::builder()
        .message_id(Some(message_id))
        .date(SystemTime::from(m.date.unwrap_or_else(Utc::now)))
        .envelope(envelope)
        .keep_bcc();

    if let Some(first) = from.iter().next().filter(|_| m.from.len() > 1) {
        builder = builder.header(header::Sender::from(first.clone()));
    }
    if !m.from.is_empty() {
        builder = builder.header(header::From::from(from));
    }
    if !m.to.is_empty() {
        builder = builder.header(header::To::from(to));
    }
    if !m.cc.is_empty() {
        builder = builder.header(header::Cc::from(cc));
    }
    if !m.bcc.is_empty() {
        builder = builder.header(header::Bcc::from(bcc));
    }
    if !m.reply_to.is_empty() {
        builder = builder.header(header::ReplyTo::from(reply_to));
    }
    if let Some(subject) = &m.subject {
        builder = builder.subject(subject.clone());
    }
    if m.encrypted {
        builder = builder.header(SudoplatformEncryption);
    }

    let text = SinglePart::builder()
        .header(if m.is_html { ContentType::TEXT_HTML } else { ContentType::TEXT_PLAIN })
        .header(ContentTransferEncoding::Base64)
        .body(m.body.clone());

    let built = if m.attachments.is_empty() {
        builder.singlepart(text)
    } else {
        let mut parts = MultiPart::mixed().singlepart(text);
        for attachment in &m.attachments {
            parts = parts.singlepart(attachment_part(attachment)?);
        }
        builder.multipart(parts)
    };
    Ok(built.map_err(build_error)?.formatted())
}

fn build_error(e: impl std::fmt::Display) -> EmailError {
    EmailError::invalid_input(format!("cannot build message: {}", e))
}

fn mailboxes(addresses: &[EmailAddress]) -> Result<Mailboxes> {
    let mut out = Mailboxes::new();
    for a in addresses {
        let email: lettre::Address = a
            .address
            .parse()
            .map_err(|e| EmailError::invalid_input(format!("invalid email address {:?}: {}", a.address, e)))?;
        let name = a.display_name.as_deref().map(sanitize_display_name);
        out.push(Mailbox::new(name, email));
    }
    Ok(out)
}

fn attachment_part(a: &EmailAttachment) -> Result<SinglePart> {
    let content_type = ContentType::parse(&a.mime_type)
        .map_err(|e| EmailError::invalid_input(format!("attachment {:?}: {}", a.file_name, e)))?;
    let disposition = if a.inline {
        ContentDisposition::inline_with_name(&a.file_name)
    } else {
        ContentDisposition::attachment(&a.file_name)
    };
    let mut part = SinglePart::builder()
        .header(content_type)
        .header(ContentTransferEncoding::Base64)
        .header(disposition);
    if !a.content_id.is_empty() {
        part = part.header(ContentId::from(format!("<{}>", a.content_id)));
    }
    Ok(part.body(a.data.clone()))
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct Part {
    headers: Vec<(String, String)>,
    body: String,
}

impl Part {
    fn parse(text: &str) -> Self {
        let (head, body) = if text.starts_with('\n') {
            ("", &text[1..])
        } else {
            match text.find("\n\n") {
                Some(i) => (&text[..i], &text[i + 2..]),
                None => (text, ""),
            }
        };

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in head.split('\n') {
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = headers.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }
        Self {
            headers,
            body: body.to_string(),
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Lower-cased media type and parameters (keys lower-cased).
    fn content_type(&self) -> (String, HashMap<String, String>) {
        match self.header("Content-Type") {
            Some(v) => split_params(v),
            None => ("text/plain".to_string(), HashMap::new()),
        }
    }

    fn decoded_body(&self) -> Result<Vec<u8>> {
        let encoding = self
            .header("Content-Transfer-Encoding")
            .map(|e| e.trim().to_ascii_lowercase())
            .unwrap_or_default();
        match encoding.as_str() {
            "base64" => {
                let compact: String = self.body.chars().filter(|c| !c.is_whitespace()).collect();
                B64.decode(compact)
                    .map_err(|e| EmailError::invalid_input(format!("invalid base64 part: {}", e)))
            }
            "quoted-printable" => Ok(decode_quoted_printable(&self.body)),
            _ => Ok(self.body.trim_end_matches('\n').as_bytes().to_vec()),
        }
    }
}

fn split_params(value: &str) -> (String, HashMap<String, String>) {
    let mut pieces = value.split(';');
    let media = pieces.next().unwrap_or_default().trim().to_ascii_lowercase();
    let params = pieces
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().trim_matches('"').to_string()))
        .collect();
    (media, params)
}

/// A parameter value, joining RFC 2231 continuations (`name*0`, `name*1*`)
/// and decoding extended `charset'lang'%XX` values.
fn param(params: &HashMap<String, String>, name: &str) -> Option<String> {
    if let Some(v) = params.get(name) {
        return Some(v.clone());
    }
    if let Some(v) = params.get(&format!("{}*", name)) {
        return Some(String::from_utf8_lossy(&percent_decode(strip_charset(v))).into_owned());
    }

    let mut segments: Vec<(usize, bool, &String)> = params
        .iter()
        .filter_map(|(k, v)| {
            let rest = k.strip_prefix(name)?.strip_prefix('*')?;
            let (index, extended) = match rest.strip_suffix('*') {
                Some(i) => (i, true),
                None => (rest, false),
            };
            Some((index.parse().ok()?, extended, v))
        })
        .collect();
    if segments.is_empty() {
        return None;
    }
    segments.sort_by_key(|(index, _, _)| *index);

    let mut bytes = Vec::new();
    for (index, extended, value) in segments {
        if extended {
            let raw = if index == 0 { strip_charset(value) } else { value.as_str() };
            bytes.extend(percent_decode(raw));
        } else {
            bytes.extend_from_slice(value.as_bytes());
        }
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn strip_charset(value: &str) -> &str {
    value.splitn(3, '\'').nth(2).unwrap_or(value)
}

fn percent_decode(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(b) = hex_byte(&bytes[i + 1..]) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn decode_message(data: &[u8]) -> Result<SimplifiedEmailMessage> {
    let text = String::from_utf8_lossy(data).replace("\r\n", "\n");
    let root = Part::parse(&text);
    if root.headers.is_empty() {
        return Err(EmailError::invalid_input("message has no headers"));
    }

    let addresses = |name: &str| -> Result<Vec<EmailAddress>> {
        match root.header(name) {
            Some(v) => parse_address_list(&decode_words(v))
                .map_err(|e| EmailError::invalid_input(format!("{} header: {}", name, e))),
            None => Ok(Vec::new()),
        }
    };

    let mut message = SimplifiedEmailMessage {
        from: addresses("From")?,
        to: addresses("To")?,
        cc: addresses("Cc")?,
        bcc: addresses("Bcc")?,
        reply_to: addresses("Reply-To")?,
        subject: root.header("Subject").map(decode_words),
        message_id: root.header("Message-ID").map(str::to_string),
        date: root
            .header("Date")
            .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
            .map(|d| d.with_timezone(&Utc)),
        encrypted: root
            .header(ENCRYPTION_HEADER)
            .map(|v| v.trim().eq_ignore_ascii_case(ENCRYPTION_HEADER_VALUE))
            .unwrap_or(false),
        ..Default::default()
    };

    let mut body = None;
    collect(&root, &mut body, &mut message.attachments, 0)?;
    if let Some((text, is_html)) = body {
        message.body = text;
        message.is_html = is_html;
    }
    Ok(message)
}

const MAX_NESTING: usize = 16;

fn collect(
    part: &Part,
    body: &mut Option<(String, bool)>,
    attachments: &mut Vec<EmailAttachment>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_NESTING {
        return Err(EmailError::invalid_input("multipart nesting too deep"));
    }
    let (media, params) = part.content_type();

    if media.starts_with("multipart/") {
        if let Some(boundary) = params.get("boundary") {
            let subparts: Vec<Part> = split_multipart(&part.body, boundary)
                .iter()
                .map(|s| Part::parse(s))
                .collect();

            if media == "multipart/alternative" {
                let mut best: Option<(String, bool)> = None;
                for sub in &subparts {
                    let mut candidate = None;
                    collect(sub, &mut candidate, attachments, depth + 1)?;
                    if let Some(c) = candidate {
                        let better = match &best {
                            None => true,
                            Some((_, is_html)) => c.1 && !is_html,
                        };
                        if better {
                            best = Some(c);
                        }
                    }
                }
                if body.is_none() {
                    *body = best;
                }
            } else {
                for sub in &subparts {
                    collect(sub, body, attachments, depth + 1)?;
                }
            }
            return Ok(());
        }
    }

    let disposition = part.header("Content-Disposition").map(split_params);
    let file_name = disposition
        .as_ref()
        .and_then(|(_, p)| param(p, "filename"))
        .or_else(|| param(&params, "name"))
        .map(|n| decode_words(&n));
    let is_attachment_disposition = disposition
        .as_ref()
        .map(|(d, _)| d == "attachment")
        .unwrap_or(false);
    let is_inline_disposition = disposition.as_ref().map(|(d, _)| d == "inline").unwrap_or(false);
    let is_text = media == "text/plain" || media == "text/html";

    let data = part.decoded_body()?;
    if is_text && file_name.is_none() && !is_attachment_disposition && body.is_none() {
        *body = Some((String::from_utf8_lossy(&data).into_owned(), media == "text/html"));
        return Ok(());
    }

    let content_id = part
        .header("Content-ID")
        .map(|c| c.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        .unwrap_or_default();
    let file_name = file_name.unwrap_or_else(|| format!("attachment-{}", attachments.len() + 1));
    attachments.push(EmailAttachment {
        file_name,
        content_id,
        mime_type: media,
        inline: is_inline_disposition,
        data,
    });
    Ok(())
}

fn split_multipart(body: &str, boundary: &str) -> Vec<String> {
    let delimiter = format!("--{}", boundary);
    let close = format!("--{}--", boundary);
    let mut parts = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    for line in body.split('\n') {
        let trimmed = line.trim_end();
        if trimmed == close {
            if let Some(lines) = current.take() {
                parts.push(lines.join("\n"));
            }
            break;
        }
        if trimmed == delimiter {
            if let Some(lines) = current.take() {
                parts.push(lines.join("\n"));
            }
            current = Some(Vec::new());
            continue;
        }
        if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }
    // unterminated final part
    if let Some(lines) = current.take() {
        parts.push(lines.join("\n"));
    }
    parts
}

/// Decode RFC 2047 encoded words (`=?charset?B|Q?text?=`). Only UTF-8 and
/// ASCII-compatible charsets are meaningful; others decode lossily.
fn decode_words(value: &str) -> String {
    let mut out = String::new();
    let mut rest = value;
    let mut last_was_word = false;
    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        match parse_encoded_word(candidate) {
            Some((decoded, consumed)) => {
                if !(last_was_word && before.trim().is_empty()) {
                    out.push_str(before);
                }
                out.push_str(&decoded);
                rest = &candidate[consumed..];
                last_was_word = true;
            }
            None => {
                out.push_str(before);
                out.push_str("=?");
                rest = &candidate[2..];
                last_was_word = false;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse one encoded word at the start of `s`; returns the text and the
/// number of bytes consumed.
fn parse_encoded_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let (_charset, rest) = inner.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let text = &rest[..end];
    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => B64.decode(text).ok()?,
        "Q" => decode_q(text),
        _ => return None,
    };
    let consumed = s.len() - rest.len() + end + 2;
    Some((String::from_utf8_lossy(&bytes).into_owned(), consumed))
}

fn decode_q(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => match hex_byte(&bytes[i + 1..]) {
                Some(b) => {
                    out.push(b);
                    i += 2;
                }
                None => out.push(b'='),
            },
            b => out.push(b),
        }
        i += 1;
    }
    out
}

fn decode_quoted_printable(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let lines: Vec<&str> = text.trim_end_matches('\n').split('\n').collect();
    for (n, line) in lines.iter().enumerate() {
        let line = line.trim_end_matches([' ', '\t']);
        let (content, soft_break) = match line.strip_suffix('=') {
            Some(c) => (c, true),
            None => (line, false),
        };
        let bytes = content.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'=' {
                if let Some(b) = hex_byte(&bytes[i + 1..]) {
                    out.push(b);
                    i += 3;
                    continue;
                }
            }
            out.push(bytes[i]);
            i += 1;
        }
        if !soft_break && n + 1 < lines.len() {
            out.push(b'\n');
        }
    }
    out
}

fn hex_byte(s: &[u8]) -> Option<u8> {
    if s.len() < 2 {
        return None;
    }
    let hi = (s[0] as char).to_digit(16)?;
    let lo = (s[1] as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
