use bytes::{BufMut, Bytes, BytesMut};

/// A `multipart/form-data` body holding a single file field.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    body: Bytes,
}

impl MultipartBody {
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

pub fn encode_file_field(
    field: &str,
    file_name: &str,
    media_type: &str,
    payload: &[u8],
) -> MultipartBody {
    let boundary = loop {
        let candidate = format!("----plate-inspector-{:016x}", rand::random::<u64>());
        if !contains(payload, candidate.as_bytes()) {
            break candidate;
        }
    };

    let part_header = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        boundary,
        field,
        escape_quoted(file_name),
        media_type
    );
    let closing = format!("\r\n--{}--\r\n", boundary);

    let mut body = BytesMut::with_capacity(part_header.len() + payload.len() + closing.len());
    body.put_slice(part_header.as_bytes());
    body.put_slice(payload);
    body.put_slice(closing.as_bytes());

    MultipartBody {
        boundary,
        body: body.freeze(),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn escape_quoted(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\r' | '\n' => ' ',
            other => other,
        })
        .collect()
}
