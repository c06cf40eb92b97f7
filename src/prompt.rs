//! Poetry styles and the prompt builder.
//!
//! `craft_prompt` is a pure function: the same batch and style always
//! produce the same prompt. Style preambles are fixed text; nothing here
//! touches the network or the clock.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::extract::PacketRecord;

/// Fixed set of poetic voices controlling the prompt's preamble and tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoetryStyle {
    Pessoa,
    Whitman,
    Dickinson,
}

impl PoetryStyle {
    pub fn all() -> &'static [PoetryStyle] {
        &[Self::Pessoa, Self::Whitman, Self::Dickinson]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pessoa => "pessoa",
            Self::Whitman => "whitman",
            Self::Dickinson => "dickinson",
        }
    }
}

impl fmt::Display for PoetryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PoetryStyle {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pessoa" => Ok(Self::Pessoa),
            "whitman" => Ok(Self::Whitman),
            "dickinson" => Ok(Self::Dickinson),
            other => Err(UnknownStyle(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown poetry style: {0}")]
pub struct UnknownStyle(String);

const PESSOA_PREAMBLE: &str = "\
Channel the introspective, philosophical voice of Fernando Pessoa's heteronyms. \
Contemplate each packet as a fleeting moment of consciousness traversing the ether. \
Reflect on the metaphysical nature of data moving through intangible spaces.";

const WHITMAN_PREAMBLE: &str = "\
Embrace Walt Whitman's grand, expansive style. \
Treat each packet as part of a cosmic tapestry of modern life. \
Weave the digital flow into humanity's universal song.";

const DICKINSON_PREAMBLE: &str = "\
Employ Emily Dickinson's delicate yet potent verse. \
Observe the micro-moments of transmission with a keen, almost reverent eye. \
Harness unusual punctuation and subtle metaphor to illuminate digital rhythms.";

/// Fixed preamble for a style.
pub fn preamble(style: PoetryStyle) -> &'static str {
    match style {
        PoetryStyle::Pessoa => PESSOA_PREAMBLE,
        PoetryStyle::Whitman => WHITMAN_PREAMBLE,
        PoetryStyle::Dickinson => DICKINSON_PREAMBLE,
    }
}

/// Build the generation prompt for one batch.
///
/// One descriptive line per record, in batch order, between the style
/// preamble and a closing instruction that names the style.
pub fn craft_prompt(packets: &[PacketRecord], style: PoetryStyle) -> String {
    let descriptions: Vec<String> = packets.iter().map(describe_packet).collect();

    format!(
        "{preamble}\n\n\
         Consider the following network movements:\n\
         {lines}\n\n\
         Transform these digital flows into a poem in the style of {style}. \
         Contemplate the symbolic meaning of packets dancing between nodes and \
         the resonance of ephemeral data in our digital consciousness.",
        preamble = preamble(style),
        lines = descriptions.join("\n"),
    )
}

fn describe_packet(packet: &PacketRecord) -> String {
    format!(
        "Data from {src} to {dst}, {length} bytes via {protocol}.",
        src = endpoint(&packet.src_ip, packet.port_src),
        dst = endpoint(&packet.dest_ip, packet.port_dst),
        length = packet.length,
        protocol = packet.protocol,
    )
}

// An absent port renders as the bare address instead of crashing or
// printing a placeholder.
fn endpoint(addr: &str, port: Option<u16>) -> String {
    match port {
        Some(port) => format!("{addr}:{port}"),
        None => addr.to_string(),
    }
}
