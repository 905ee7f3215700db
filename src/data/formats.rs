//! Sequence file formats.
//!
//! `fasta`: `>name` lines followed by (possibly wrapped) sequence lines.
//! `paml`: a `<num_seqs> <length>` header, then a name line and a sequence
//! line per record.

use crate::core::error::BioappError;
use crate::data::seqs::SequenceCollection;
use std::fmt::Write;
use std::str::FromStr;

const FASTA_WRAP: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqFormat {
    Fasta,
    Paml,
}

impl FromStr for SeqFormat {
    type Err = BioappError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "fasta" | "fa" | "fna" | "faa" => Ok(SeqFormat::Fasta),
            "paml" | "phy" | "phylip" => Ok(SeqFormat::Paml),
            other => Err(BioappError::Configuration(format!(
                "unsupported sequence format '{}'",
                other
            ))),
        }
    }
}

impl SeqFormat {
    pub fn name(self) -> &'static str {
        match self {
            SeqFormat::Fasta => "fasta",
            SeqFormat::Paml => "paml",
        }
    }

    pub fn parse(self, text: &str) -> Result<SequenceCollection, String> {
        match self {
            SeqFormat::Fasta => parse_fasta(text),
            SeqFormat::Paml => parse_paml(text),
        }
    }

    pub fn format(self, seqs: &SequenceCollection) -> String {
        match self {
            SeqFormat::Fasta => format_fasta(seqs),
            SeqFormat::Paml => format_paml(seqs),
        }
    }
}

fn parse_fasta(text: &str) -> Result<SequenceCollection, String> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if let Some(label) = line.strip_prefix('>') {
            let name = label.split_whitespace().next().unwrap_or("").to_string();
            if name.is_empty() {
                return Err(format!("empty sequence label on line {}", lineno + 1));
            }
            pairs.push((name, String::new()));
        } else {
            match pairs.last_mut() {
                Some((_, seq)) => seq.push_str(line),
                None => return Err(format!("sequence data before label on line {}", lineno + 1)),
            }
        }
    }
    if pairs.is_empty() {
        return Err("no sequences found".to_string());
    }
    Ok(SequenceCollection::new(pairs))
}

fn format_fasta(seqs: &SequenceCollection) -> String {
    let mut out = String::new();
    for s in &seqs.seqs {
        let _ = writeln!(out, ">{}", s.name);
        let chars: Vec<char> = s.seq.chars().collect();
        for chunk in chars.chunks(FASTA_WRAP) {
            out.extend(chunk);
            out.push('\n');
        }
    }
    out
}

fn parse_paml(text: &str) -> Result<SequenceCollection, String> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let header = lines.next().ok_or("empty paml file")?;
    let dims: Vec<usize> = header
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid paml header '{}': {}", header, e))?;
    let &[num_seqs, length] = dims.as_slice() else {
        return Err(format!("invalid paml header '{}'", header));
    };
    // header counts are untrusted
    let mut pairs = Vec::new();
    for _ in 0..num_seqs {
        let name = lines.next().ok_or("missing paml sequence name")?;
        let mut seq = String::new();
        let mut seq_len = 0;
        while seq_len < length {
            let line = lines
                .next()
                .ok_or_else(|| format!("sequence '{}' is shorter than {}", name, length))?;
            for c in line.chars().filter(|c| !c.is_whitespace()) {
                seq.push(c);
                seq_len += 1;
            }
        }
        if seq_len != length {
            return Err(format!("sequence '{}' is longer than {}", name, length));
        }
        pairs.push((name.to_string(), seq));
    }
    Ok(SequenceCollection::new(pairs))
}

fn format_paml(seqs: &SequenceCollection) -> String {
    let length = seqs.seqs.first().map_or(0, |s| s.len());
    let mut out = format!("{}  {}\n", seqs.num_seqs(), length);
    for s in &seqs.seqs {
        let _ = writeln!(out, "{}\n{}", s.name, s.seq);
    }
    out
}
