//! Dot-format netlist persistence.
//!
//! Netlists are stored as graphviz-style directed graphs. Node statements
//! declare blocks with their ports and timing attributes, edge statements
//! declare channels:
//!
//! ```text
//! digraph loop_kernel {
//!   "add" [type = Operator, bb = 1, in = "in1:32 in2:32", out = "out1:32", delay = "1.7"];
//!   "add" -> "cmp" [from = "out1", to = "in1", slots = 1, transparent = false];
//! }
//! ```
//!
//! Port specs are `name:width` with an optional role suffix (`*s` selection,
//! `*t` true, `*f` false). Unrecognized attributes are ignored so files from
//! richer producers still load.

use crate::entity::{BlockKind, PortDir, PortRole};
use crate::error::NetlistError;
use crate::ids::BlockId;
use crate::netlist::Netlist;
use std::fmt::Write as _;
use thiserror::Error;

/// Errors produced while reading a dot file.
#[derive(Debug, Error)]
pub enum DotError {
    /// Syntax or semantic error at a source line.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based source line.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// A structurally invalid connection was described.
    #[error(transparent)]
    Netlist(#[from] NetlistError),
}

fn err<T>(line: usize, message: impl Into<String>) -> Result<T, DotError> {
    Err(DotError::Parse {
        line,
        message: message.into(),
    })
}

// ---- writer ---------------------------------------------------------------

fn fmt_f64(x: f64) -> String {
    // Keep integers readable while preserving fractional values exactly
    // enough to round-trip through the parser.
    if x == x.trunc() && x.abs() < 1e15 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

fn port_spec(nl: &Netlist, port: crate::ids::PortId) -> String {
    let p = nl.port(port);
    let suffix = match p.role {
        PortRole::Generic => "",
        PortRole::Selection => "*s",
        PortRole::True => "*t",
        PortRole::False => "*f",
    };
    format!("{}:{}{}", p.name, p.width, suffix)
}

/// Serializes a netlist to dot text.
pub fn write_dot(nl: &Netlist) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", nl.name);
    let mut blocks: Vec<&crate::entity::Block> = nl.blocks().map(|(_, b)| b).collect();
    blocks.sort_by(|a, b| a.name.cmp(&b.name));
    for b in blocks {
        let mut attrs = vec![format!("type = {}", b.kind.as_str())];
        if let Some(bb) = b.basic_block {
            attrs.push(format!("bb = {bb}"));
        }
        if !b.inputs.is_empty() {
            let specs: Vec<String> = b.inputs.iter().map(|&p| port_spec(nl, p)).collect();
            attrs.push(format!("in = \"{}\"", specs.join(" ")));
        }
        if !b.outputs.is_empty() {
            let specs: Vec<String> = b.outputs.iter().map(|&p| port_spec(nl, p)).collect();
            attrs.push(format!("out = \"{}\"", specs.join(" ")));
        }
        if b.delays.iter().any(|&d| d != 0.0) {
            let ds: Vec<String> = b.delays.iter().map(|&d| fmt_f64(d)).collect();
            attrs.push(format!("delay = \"{}\"", ds.join(" ")));
        }
        let pdelays: Vec<String> = b
            .ports()
            .filter(|&p| nl.port(p).delay != 0.0)
            .map(|p| format!("{}:{}", nl.port(p).name, fmt_f64(nl.port(p).delay)))
            .collect();
        if !pdelays.is_empty() {
            attrs.push(format!("pdelay = \"{}\"", pdelays.join(" ")));
        }
        if b.latency > 0 {
            attrs.push(format!("latency = {}", b.latency));
        }
        if b.initiation_interval != 1 {
            attrs.push(format!("ii = {}", b.initiation_interval));
        }
        if b.frequency != 1.0 {
            attrs.push(format!("freq = {}", fmt_f64(b.frequency)));
        }
        if b.true_fraction != 0.5 {
            attrs.push(format!("frac = {}", fmt_f64(b.true_fraction)));
        }
        if b.kind == BlockKind::Buffer {
            attrs.push(format!("slots = {}", b.slots));
            attrs.push(format!("transparent = {}", b.transparent));
        }
        if b.kind == BlockKind::Constant {
            attrs.push(format!("value = {}", b.value));
        }
        let _ = writeln!(out, "  \"{}\" [{}];", b.name, attrs.join(", "));
    }
    let mut channels: Vec<_> = nl.channels().collect();
    channels.sort_by_key(|&(id, _)| id.as_raw());
    for (_, ch) in channels {
        let src = nl.port(ch.src);
        let dst = nl.port(ch.dst);
        let src_name = &nl.block(src.block).name;
        let dst_name = &nl.block(dst.block).name;
        let mut attrs = vec![
            format!("from = \"{}\"", src.name),
            format!("to = \"{}\"", dst.name),
        ];
        if ch.slots > 0 {
            attrs.push(format!("slots = {}", ch.slots));
            attrs.push(format!("transparent = {}", ch.transparent));
        }
        if ch.explicit_buffer {
            attrs.push("buffer = true".to_string());
        }
        if ch.frequency != 1.0 {
            attrs.push(format!("freq = {}", fmt_f64(ch.frequency)));
        }
        if ch.back_edge {
            attrs.push("back = true".to_string());
        }
        let _ = writeln!(
            out,
            "  \"{src_name}\" -> \"{dst_name}\" [{}];",
            attrs.join(", ")
        );
    }
    out.push_str("}\n");
    out
}

// ---- lexer ----------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Eq,
    Arrow,
}

fn lex(text: &str) -> Result<Vec<(usize, Token)>, DotError> {
    let bytes: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '/' if bytes.get(i + 1) == Some(&'/') => {
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
            }
            '#' => {
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
            }
            '{' => {
                tokens.push((line, Token::LBrace));
                i += 1;
            }
            '}' => {
                tokens.push((line, Token::RBrace));
                i += 1;
            }
            '[' => {
                tokens.push((line, Token::LBracket));
                i += 1;
            }
            ']' => {
                tokens.push((line, Token::RBracket));
                i += 1;
            }
            ';' => {
                tokens.push((line, Token::Semi));
                i += 1;
            }
            ',' => {
                tokens.push((line, Token::Comma));
                i += 1;
            }
            '=' => {
                tokens.push((line, Token::Eq));
                i += 1;
            }
            '-' if bytes.get(i + 1) == Some(&'>') => {
                tokens.push((line, Token::Arrow));
                i += 2;
            }
            '"' => {
                let start_line = line;
                i += 1;
                let mut s = String::new();
                loop {
                    match bytes.get(i) {
                        None => return err(start_line, "unterminated string"),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\n') => {
                            line += 1;
                            s.push('\n');
                            i += 1;
                        }
                        Some(&c) => {
                            s.push(c);
                            i += 1;
                        }
                    }
                }
                tokens.push((start_line, Token::Str(s)));
            }
            _ => {
                let mut s = String::new();
                while i < bytes.len() {
                    let c = bytes[i];
                    if c.is_whitespace() || "{}[];,=\"".contains(c) {
                        break;
                    }
                    if c == '-' && bytes.get(i + 1) == Some(&'>') {
                        break;
                    }
                    s.push(c);
                    i += 1;
                }
                tokens.push((line, Token::Word(s)));
            }
        }
    }
    Ok(tokens)
}

// ---- parser ---------------------------------------------------------------

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map_or(0, |(l, _)| *l)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token, what: &str) -> Result<usize, DotError> {
        match self.next() {
            Some((line, t)) if t == want => Ok(line),
            Some((line, _)) => err(line, format!("expected {what}")),
            None => err(self.line(), format!("expected {what}, found end of input")),
        }
    }

    /// A block/port name: either a bare word or a quoted string.
    fn name(&mut self, what: &str) -> Result<(usize, String), DotError> {
        match self.next() {
            Some((line, Token::Word(w))) => Ok((line, w)),
            Some((line, Token::Str(s))) => Ok((line, s)),
            Some((line, _)) => err(line, format!("expected {what}")),
            None => err(self.line(), format!("expected {what}, found end of input")),
        }
    }

    /// Parses `[ key = value, ... ]` if present.
    fn attrs(&mut self) -> Result<Vec<(usize, String, String)>, DotError> {
        let mut out = Vec::new();
        if self.peek() != Some(&Token::LBracket) {
            return Ok(out);
        }
        self.next();
        loop {
            match self.peek() {
                Some(Token::RBracket) => {
                    self.next();
                    break;
                }
                Some(Token::Comma) => {
                    self.next();
                }
                _ => {
                    let (line, key) = self.name("attribute name")?;
                    self.expect(Token::Eq, "`=`")?;
                    let (_, value) = self.name("attribute value")?;
                    out.push((line, key, value));
                }
            }
        }
        Ok(out)
    }
}

fn parse_f64(line: usize, value: &str) -> Result<f64, DotError> {
    value
        .trim()
        .parse()
        .map_err(|_| DotError::Parse {
            line,
            message: format!("`{value}` is not a number"),
        })
}

fn parse_u32(line: usize, value: &str) -> Result<u32, DotError> {
    value
        .trim()
        .parse()
        .map_err(|_| DotError::Parse {
            line,
            message: format!("`{value}` is not a non-negative integer"),
        })
}

fn parse_i64(line: usize, value: &str) -> Result<i64, DotError> {
    value
        .trim()
        .parse()
        .map_err(|_| DotError::Parse {
            line,
            message: format!("`{value}` is not an integer"),
        })
}

fn parse_bool(line: usize, value: &str) -> Result<bool, DotError> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => err(line, format!("`{value}` is not a boolean")),
    }
}

fn add_ports(
    nl: &mut Netlist,
    block: BlockId,
    dir: PortDir,
    line: usize,
    spec: &str,
) -> Result<(), DotError> {
    for item in spec.split_whitespace() {
        let (name_width, role) = if let Some(stripped) = item.strip_suffix("*s") {
            (stripped, PortRole::Selection)
        } else if let Some(stripped) = item.strip_suffix("*t") {
            (stripped, PortRole::True)
        } else if let Some(stripped) = item.strip_suffix("*f") {
            (stripped, PortRole::False)
        } else {
            (item, PortRole::Generic)
        };
        let Some((name, width)) = name_width.split_once(':') else {
            return err(line, format!("port spec `{item}` is missing `:width`"));
        };
        let width = parse_u32(line, width)?;
        nl.add_port(block, dir, Some(name), width, role)?;
    }
    Ok(())
}

/// Parses dot text into a netlist.
pub fn read_dot(text: &str) -> Result<Netlist, DotError> {
    let mut p = Parser {
        tokens: lex(text)?,
        pos: 0,
    };
    match p.next() {
        Some((_, Token::Word(w))) if w == "digraph" => {}
        Some((line, _)) => return err(line, "expected `digraph`"),
        None => return err(1, "empty input"),
    }
    let graph_name = if matches!(p.peek(), Some(Token::Word(_) | Token::Str(_))) {
        p.name("graph name")?.1
    } else {
        String::new()
    };
    p.expect(Token::LBrace, "`{`")?;
    let mut nl = Netlist::new(graph_name);

    loop {
        match p.peek() {
            Some(Token::RBrace) => {
                p.next();
                break;
            }
            Some(Token::Semi) => {
                p.next();
            }
            None => return err(p.line(), "expected `}`, found end of input"),
            _ => {
                let (line, first) = p.name("block name")?;
                if p.peek() == Some(&Token::Arrow) {
                    p.next();
                    let (_, second) = p.name("block name")?;
                    parse_edge(&mut nl, &mut p, line, &first, &second)?;
                } else {
                    parse_node(&mut nl, &mut p, line, &first)?;
                }
            }
        }
    }
    Ok(nl)
}

fn parse_node(nl: &mut Netlist, p: &mut Parser, line: usize, name: &str) -> Result<(), DotError> {
    let attrs = p.attrs()?;
    let kind = attrs
        .iter()
        .find(|(_, k, _)| k == "type")
        .map_or(BlockKind::Operator, |(_, _, v)| BlockKind::parse(v));
    if nl.find_block(name).is_some() {
        return err(line, format!("block `{name}` declared twice"));
    }
    let block = nl.add_block(kind, Some(name))?;
    let mut pdelay_spec = None;
    for (aline, key, value) in &attrs {
        match key.as_str() {
            "type" => {}
            "bb" => nl.block_mut(block).basic_block = Some(parse_u32(*aline, value)?),
            "in" => add_ports(nl, block, PortDir::In, *aline, value)?,
            "out" => add_ports(nl, block, PortDir::Out, *aline, value)?,
            "delay" => {
                let mut ds = Vec::new();
                for d in value.split_whitespace() {
                    ds.push(parse_f64(*aline, d)?);
                }
                nl.block_mut(block).delays = ds;
            }
            "pdelay" => pdelay_spec = Some((*aline, value.clone())),
            "latency" => nl.block_mut(block).latency = parse_u32(*aline, value)?,
            "ii" => nl.block_mut(block).initiation_interval = parse_u32(*aline, value)?.max(1),
            "freq" => nl.block_mut(block).frequency = parse_f64(*aline, value)?,
            "frac" => nl.block_mut(block).true_fraction = parse_f64(*aline, value)?,
            "slots" => nl.block_mut(block).slots = parse_u32(*aline, value)?,
            "transparent" => nl.block_mut(block).transparent = parse_bool(*aline, value)?,
            "value" => nl.block_mut(block).value = parse_i64(*aline, value)?,
            _ => {}
        }
    }
    // Port delays arrive after the ports they refer to exist.
    if let Some((dline, spec)) = pdelay_spec {
        for item in spec.split_whitespace() {
            let Some((pname, d)) = item.split_once(':') else {
                return err(dline, format!("pdelay spec `{item}` is missing `:delay`"));
            };
            let Some(port) = nl.find_port(block, pname) else {
                return err(dline, format!("block `{name}` has no port `{pname}`"));
            };
            nl.set_port_delay(port, parse_f64(dline, d)?)?;
        }
    }
    Ok(())
}

fn parse_edge(
    nl: &mut Netlist,
    p: &mut Parser,
    line: usize,
    src_name: &str,
    dst_name: &str,
) -> Result<(), DotError> {
    let attrs = p.attrs()?;
    let Some(src_block) = nl.find_block(src_name) else {
        return err(line, format!("unknown block `{src_name}`"));
    };
    let Some(dst_block) = nl.find_block(dst_name) else {
        return err(line, format!("unknown block `{dst_name}`"));
    };
    let from = attrs.iter().find(|(_, k, _)| k == "from");
    let to = attrs.iter().find(|(_, k, _)| k == "to");
    let src_port = match from {
        Some((aline, _, v)) => nl
            .find_port(src_block, v)
            .ok_or_else(|| DotError::Parse {
                line: *aline,
                message: format!("block `{src_name}` has no port `{v}`"),
            })?,
        None => {
            let outs = &nl.block(src_block).outputs;
            if outs.len() != 1 {
                return err(line, format!("edge from `{src_name}` needs a `from` port"));
            }
            outs[0]
        }
    };
    let dst_port = match to {
        Some((aline, _, v)) => nl
            .find_port(dst_block, v)
            .ok_or_else(|| DotError::Parse {
                line: *aline,
                message: format!("block `{dst_name}` has no port `{v}`"),
            })?,
        None => {
            let ins = &nl.block(dst_block).inputs;
            if ins.len() != 1 {
                return err(line, format!("edge into `{dst_name}` needs a `to` port"));
            }
            ins[0]
        }
    };
    let channel = nl.connect(src_port, dst_port)?;
    for (aline, key, value) in &attrs {
        match key.as_str() {
            "from" | "to" => {}
            "slots" => nl.channel_mut(channel).slots = parse_u32(*aline, value)?,
            "transparent" => nl.channel_mut(channel).transparent = parse_bool(*aline, value)?,
            "buffer" => nl.channel_mut(channel).explicit_buffer = parse_bool(*aline, value)?,
            "freq" => nl.channel_mut(channel).frequency = parse_f64(*aline, value)?,
            "back" => nl.channel_mut(channel).back_edge = parse_bool(*aline, value)?,
            _ => {}
        }
    }
    Ok(())
}
