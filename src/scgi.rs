//! SCGI request framing and Gemini response writing.
//!
//! An SCGI request is a netstring: `<length>:<headers>,` where the header
//! block is a flat sequence of NUL-terminated name/value pairs. The response
//! sent back is a Gemini status line (`<status> <meta>\r\n`), with a
//! `text/gemini` body attached for success statuses.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};

#[derive(Debug)]
pub enum ScgiError {
    Io(std::io::Error),
    Malformed(String),
}

impl fmt::Display for ScgiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScgiError::Io(err) => write!(f, "error reading request: {}", err),
            ScgiError::Malformed(detail) => write!(f, "malformed SCGI request: {}", detail),
        }
    }
}

impl Error for ScgiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ScgiError::Io(err) => Some(err),
            ScgiError::Malformed(_) => None,
        }
    }
}

impl From<std::io::Error> for ScgiError {
    fn from(value: std::io::Error) -> Self {
        ScgiError::Io(value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScgiRequest {
    pub headers: HashMap<String, String>,
}

impl ScgiRequest {
    pub fn path(&self) -> &str {
        self.headers.get("PATH_INFO").map_or("", String::as_str)
    }

    pub fn query_string(&self) -> &str {
        self.headers.get("QUERY_STRING").map_or("", String::as_str)
    }
}

pub fn read_request<R: Read>(stream: R) -> Result<ScgiRequest, ScgiError> {
    let mut reader = BufReader::new(stream);

    let mut length_bytes = Vec::new();
    reader.read_until(b':', &mut length_bytes)?;
    if length_bytes.pop() != Some(b':') {
        return Err(ScgiError::Malformed("missing length separator".to_string()));
    }
    let length_text = String::from_utf8_lossy(&length_bytes);
    let length: usize = length_text.parse().map_err(|_| {
        ScgiError::Malformed(format!("invalid request length \"{length_text}\""))
    })?;

    let mut raw = vec![0u8; length];
    reader.read_exact(&mut raw)?;

    let mut trailer = [0u8; 1];
    reader.read_exact(&mut trailer)?;
    if trailer[0] != b',' {
        return Err(ScgiError::Malformed("missing trailing comma".to_string()));
    }

    let mut headers = HashMap::new();
    let fields: Vec<&[u8]> = raw.split(|byte| *byte == 0).collect();
    for pair in fields.chunks(2) {
        if let [name, value] = pair {
            headers.insert(
                String::from_utf8_lossy(name).into_owned(),
                String::from_utf8_lossy(value).into_owned(),
            );
        }
    }

    Ok(ScgiRequest { headers })
}

/// Writes a Gemini response line. Success statuses (2x) carry a
/// `text/gemini` body; every other class sends the text as the meta field.
pub fn write_response<W: Write>(writer: &mut W, status: u8, text: &str) -> std::io::Result<()> {
    if (20..30).contains(&status) {
        write!(writer, "{} text/gemini\r\n{}\r\n", status, text)
    } else {
        write!(writer, "{} {}\r\n", status, text)
    }
}
