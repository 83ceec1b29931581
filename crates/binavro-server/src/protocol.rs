//! Line-oriented CDC client protocol
//!
//! ```text
//! REGISTER UUID=<36-char-uuid>[, TYPE={AVRO|JSON}]   ->  OK | ERR, code 12, ...
//! REQUEST-DATA <filestem>[ <domain>-<server_id>-<seq>] -> schema preamble + stream
//! anything else                                       ->  ECHO:<line>
//! ```

use binavro_core::Gtid;
use uuid::Uuid;

/// Reply sent on a successful registration.
pub const OK_RESPONSE: &str = "OK";

/// Reply sent when registration fails.
pub const ERR_REGISTRATION: &str = "ERR, code 12, msg: Registration failed";

/// Reply when REQUEST-DATA carries no argument at all.
pub const ERR_NO_DATA: &str = "ERR REQUEST-DATA with no data";

/// Reply when the Avro file stem is empty.
pub const ERR_NO_FILE_SPECIFIED: &str = "ERR avro file not specified";

/// Output format requested at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientFormat {
    /// Native Avro container blocks, passed through unchanged.
    #[default]
    Avro,
    /// One JSON object per record.
    Json,
}

/// A parsed client request line.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Register {
        uuid: String,
        format: ClientFormat,
    },
    RequestData {
        /// `db.table` or `db.table.000002`.
        filestem: String,
        /// Optional seek target.
        gtid: Option<Gtid>,
    },
    /// REQUEST-DATA with a missing or empty argument.
    BadRequestData {
        reply: &'static str,
    },
    /// Registration line that did not validate.
    BadRegister,
    /// Anything else is echoed back.
    Unknown(String),
}

/// Parse one request line.
pub fn parse_request(line: &str) -> Request {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.strip_prefix("REGISTER ") {
        return parse_register(rest);
    }
    if line == "REQUEST-DATA" {
        return Request::BadRequestData {
            reply: ERR_NO_DATA,
        };
    }
    if let Some(rest) = line.strip_prefix("REQUEST-DATA ") {
        return parse_request_data(rest);
    }

    Request::Unknown(line.to_string())
}

fn parse_register(rest: &str) -> Request {
    let Some(uuid_part) = rest.trim().strip_prefix("UUID=") else {
        return Request::BadRegister;
    };

    // The UUID ends at a comma or whitespace; the rest holds options.
    let end = uuid_part
        .find([',', ' '])
        .unwrap_or(uuid_part.len());
    let uuid = &uuid_part[..end];
    if Uuid::parse_str(uuid).is_err() {
        return Request::BadRegister;
    }

    let options = &uuid_part[end..];
    let format = match options.find("TYPE=") {
        Some(idx) => {
            let value = options[idx + 5..]
                .split([',', ' '])
                .next()
                .unwrap_or_default();
            match value {
                "AVRO" => ClientFormat::Avro,
                "JSON" => ClientFormat::Json,
                _ => return Request::BadRegister,
            }
        }
        None => ClientFormat::Avro,
    };

    Request::Register {
        uuid: uuid.to_string(),
        format,
    }
}

fn parse_request_data(rest: &str) -> Request {
    let mut parts = rest.split_whitespace();
    let Some(filestem) = parts.next() else {
        return Request::BadRequestData {
            reply: ERR_NO_FILE_SPECIFIED,
        };
    };

    let gtid = parts.next().and_then(|g| g.parse::<Gtid>().ok());

    Request::RequestData {
        filestem: filestem.to_string(),
        gtid,
    }
}
