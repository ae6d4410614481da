//! Command-line parsing
//!
//! `peerlink [--config PATH] <command> [args]`

use crate::error::Error;

pub const USAGE: &str = "peerlink [--config PATH] <command>

commands:
  login <username>
  register <username> <email>
  logout
  status
  search <query> [--group ID] [--filter FIELD]
  send-magnet <magnet>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        username: String,
    },
    Register {
        username: String,
        email: String,
    },
    Logout,
    Status,
    Search {
        query: String,
        group: Option<String>,
        filter: Option<String>,
    },
    SendMagnet {
        magnet: String,
    },
}

impl Command {
    /// Label used for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::Register { .. } => "register",
            Command::Logout => "logout",
            Command::Status => "status",
            Command::Search { .. } => "search",
            Command::SendMagnet { .. } => "send-magnet",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: Option<String>,
    pub command: Command,
}

/// Parse arguments, excluding the program name.
pub fn parse(args: &[String]) -> Result<Invocation, Error> {
    let mut config_path = None;
    let mut group = None;
    let mut filter = None;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => config_path = Some(flag_value(&mut iter, "--config")?),
            "--group" => group = Some(flag_value(&mut iter, "--group")?),
            "--filter" => filter = Some(flag_value(&mut iter, "--filter")?),
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional
        .next()
        .ok_or_else(|| Error::Usage("missing command".into()))?;
    let mut next = |what: &str| {
        positional
            .next()
            .ok_or_else(|| Error::Usage(format!("{name} requires <{what}>")))
    };

    let command = match name.as_str() {
        "login" => Command::Login {
            username: next("username")?,
        },
        "register" => Command::Register {
            username: next("username")?,
            email: next("email")?,
        },
        "logout" => Command::Logout,
        "status" => Command::Status,
        "search" => Command::Search {
            query: next("query")?,
            group: group.take(),
            filter: filter.take(),
        },
        "send-magnet" => Command::SendMagnet {
            magnet: next("magnet")?,
        },
        other => return Err(Error::Usage(format!("unknown command: {other}"))),
    };

    if let Some(extra) = positional.next() {
        return Err(Error::Usage(format!("unexpected argument: {extra}")));
    }
    if group.is_some() || filter.is_some() {
        return Err(Error::Usage("--group and --filter only apply to search".into()));
    }

    Ok(Invocation {
        config_path,
        command,
    })
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String, Error> {
    iter.next()
        .cloned()
        .ok_or_else(|| Error::Usage(format!("{flag} requires a value")))
}
