//! Inbound command vocabulary.
//!
//! Button payloads are `verb|arg1|arg2...`, optionally preceded by a transport
//! escape (`\f`) and/or a leading `/`. They are decoded exactly once into
//! [`Command`]; nothing downstream looks at raw strings.

use crate::domain::{CatalogId, ServiceInstanceId};

const ARG_SEP: char = '|';
const TRANSPORT_ESCAPE: char = '\u{c}';

/// Typed slash command (`/start`, `/register`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlashCommand {
    Start { param: Option<String> },
    Register,
    Other(String),
}

/// Parse `/cmd@botname arg...`. Returns `None` for non-command text.
pub fn parse_slash_command(text: &str) -> Option<SlashCommand> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    Some(match cmd.as_str() {
        "start" => SlashCommand::Start {
            param: (!rest.is_empty()).then(|| rest.to_string()),
        },
        "register" => SlashCommand::Register,
        _ => SlashCommand::Other(cmd),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Menu,
    Balance,
    List,
    PriceList,
    Help,
    Payments,
    Register,
    Trial,
    Service(ServiceInstanceId),
    Order(CatalogId),
    DownloadKey(ServiceInstanceId),
    ShowQr(ServiceInstanceId),
    ShowMarzbanKeys(ServiceInstanceId),
    Delete(ServiceInstanceId),
    DeleteConfirmed(ServiceInstanceId),
}

/// Result of decoding a button payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    Command(Command),
    Unknown(String),
    Malformed { verb: String, reason: String },
}

impl Command {
    pub fn decode(raw: &str) -> Decoded {
        let stripped = raw
            .trim()
            .trim_start_matches(TRANSPORT_ESCAPE)
            .trim_start_matches('/');
        let mut parts = stripped.split(ARG_SEP);
        let verb = parts.next().unwrap_or("").trim();
        let args: Vec<&str> = parts.map(str::trim).collect();

        let simple = |c: Command| Decoded::Command(c);
        match verb {
            "menu" => simple(Command::Menu),
            "balance" => simple(Command::Balance),
            "list" => simple(Command::List),
            "pricelist" => simple(Command::PriceList),
            "help" => simple(Command::Help),
            "pays" => simple(Command::Payments),
            "register" => simple(Command::Register),
            "trial" => simple(Command::Trial),
            "service" => with_instance(verb, &args, Command::Service),
            "serviceorder" => with_id(verb, &args, |id| Command::Order(CatalogId(id))),
            "download_qr" => with_instance(verb, &args, Command::DownloadKey),
            "show_qr" => with_instance(verb, &args, Command::ShowQr),
            "show_mz_keys" => with_instance(verb, &args, Command::ShowMarzbanKeys),
            "delete" => with_instance(verb, &args, Command::Delete),
            "delete_confirmed" => with_instance(verb, &args, Command::DeleteConfirmed),
            other => Decoded::Unknown(other.to_string()),
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Menu => "menu",
            Command::Balance => "balance",
            Command::List => "list",
            Command::PriceList => "pricelist",
            Command::Help => "help",
            Command::Payments => "pays",
            Command::Register => "register",
            Command::Trial => "trial",
            Command::Service(_) => "service",
            Command::Order(_) => "serviceorder",
            Command::DownloadKey(_) => "download_qr",
            Command::ShowQr(_) => "show_qr",
            Command::ShowMarzbanKeys(_) => "show_mz_keys",
            Command::Delete(_) => "delete",
            Command::DeleteConfirmed(_) => "delete_confirmed",
        }
    }

    /// Callback payload for a button that triggers this command.
    pub fn encode(&self) -> String {
        let arg = match self {
            Command::Service(id)
            | Command::DownloadKey(id)
            | Command::ShowQr(id)
            | Command::ShowMarzbanKeys(id)
            | Command::Delete(id)
            | Command::DeleteConfirmed(id) => Some(id.0),
            Command::Order(id) => Some(id.0),
            _ => None,
        };
        match arg {
            Some(a) => format!("{}{ARG_SEP}{a}", self.verb()),
            None => self.verb().to_string(),
        }
    }

    /// Registration and help read no account data; everything else does.
    pub fn requires_account(&self) -> bool {
        !matches!(self, Command::Register | Command::Help)
    }
}

fn with_id(verb: &str, args: &[&str], build: impl FnOnce(i64) -> Command) -> Decoded {
    let Some(raw) = args.first().filter(|a| !a.is_empty()) else {
        return Decoded::Malformed {
            verb: verb.to_string(),
            reason: "missing id argument".to_string(),
        };
    };
    match raw.parse::<i64>() {
        Ok(id) => Decoded::Command(build(id)),
        Err(_) => Decoded::Malformed {
            verb: verb.to_string(),
            reason: format!("invalid id argument: {raw}"),
        },
    }
}

fn with_instance(
    verb: &str,
    args: &[&str],
    build: impl FnOnce(ServiceInstanceId) -> Command,
) -> Decoded {
    with_id(verb, args, |id| build(ServiceInstanceId(id)))
}
