//! Script parser
//!
//! One instruction per line, whitespace separated, keywords are case
//! sensitive. Lines starting with `#` are comments. Loops are paired while
//! parsing so the sequencer can jump without scanning.

use sonicamp_core::{HoldTime, ScriptError, TimeUnit};
use sonicamp_procedures::RampArgs;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// On-time of a ramp step when the script omits it
pub const DEFAULT_RAMP_HOLD_ON: HoldTime = HoldTime {
    value: 100.0,
    unit: TimeUnit::Milliseconds,
};

/// How often a loop body runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    /// A fixed number of passes; `Times(0)` skips the body.
    Times(u32),
    /// Until the script is cancelled.
    Infinite,
}

impl fmt::Display for LoopCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Times(n) => write!(f, "{}", n),
            Self::Infinite => write!(f, "inf"),
        }
    }
}

/// A single script instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `frequency <hz>`
    SetFrequency(u32),
    /// `gain <percent>`
    SetGain(u32),
    /// `on`
    SignalOn,
    /// `off`
    SignalOff,
    /// `auto`, `AUTO` or `!AUTO`
    SignalAuto,
    /// `hold <duration>`
    Hold(HoldTime),
    /// `ramp_freq <center> <half_range> <step> [ton [toff]]`
    RampFreq {
        center: u32,
        half_range: u32,
        step: u32,
        hold_on: HoldTime,
        hold_off: HoldTime,
    },
    /// `ramp_freq_range <start> <stop> <step> [ton [toff]]`
    RampFreqRange(RampArgs),
    /// `startloop [count|inf]`
    LoopBegin(LoopCount),
    /// `endloop`
    LoopEnd,
    /// A line starting with `!` or `?`, sent as written
    Raw(String),
}

impl Instruction {
    /// Ramp arguments for the ramp instructions
    pub fn ramp_args(&self) -> Option<RampArgs> {
        match self {
            Self::RampFreq {
                center,
                half_range,
                step,
                hold_on,
                hold_off,
            } => Some(RampArgs::centered(
                *center,
                *half_range,
                *step,
                *hold_on,
                *hold_off,
            )),
            Self::RampFreqRange(args) => Some(args.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetFrequency(hz) => write!(f, "frequency {}", hz),
            Self::SetGain(gain) => write!(f, "gain {}", gain),
            Self::SignalOn => write!(f, "on"),
            Self::SignalOff => write!(f, "off"),
            Self::SignalAuto => write!(f, "auto"),
            Self::Hold(time) => write!(f, "hold {}", time),
            Self::RampFreq {
                center,
                half_range,
                step,
                hold_on,
                hold_off,
            } => write!(
                f,
                "ramp_freq {} {} {} {} {}",
                center, half_range, step, hold_on, hold_off
            ),
            Self::RampFreqRange(args) => write!(
                f,
                "ramp_freq_range {} {} {} {} {}",
                args.start, args.stop, args.step, args.hold_on, args.hold_off
            ),
            Self::LoopBegin(count) => write!(f, "startloop {}", count),
            Self::LoopEnd => write!(f, "endloop"),
            Self::Raw(text) => write!(f, "{}", text),
        }
    }
}

/// An instruction and the source line it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    /// One-based line in the source text.
    pub line: usize,
    /// What the line asks for.
    pub instruction: Instruction,
}

/// A resolved `startloop`/`endloop` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSpan {
    /// Index of the `startloop` instruction.
    pub begin: usize,
    /// Index of the matching `endloop` instruction.
    pub end: usize,
    /// Passes through the body.
    pub count: LoopCount,
}

/// A parsed script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    lines: Vec<ScriptLine>,
    /// Parallel to `lines`; set on both ends of every loop.
    loops: Vec<Option<LoopSpan>>,
}

impl Script {
    /// Parse script source
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let mut lines = Vec::new();
        for (index, text) in source.lines().enumerate() {
            let text = text.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            lines.push(ScriptLine {
                line: index + 1,
                instruction: parse_line(index + 1, text)?,
            });
        }
        let loops = resolve_loops(&lines)?;
        Ok(Self { lines, loops })
    }

    /// Read and parse a script file
    pub fn from_file(path: &Path) -> sonicamp_core::Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::parse(&source)?)
    }

    /// Instructions in order
    pub fn lines(&self) -> &[ScriptLine] {
        &self.lines
    }

    /// Instruction at `index`
    pub fn get(&self, index: usize) -> Option<&ScriptLine> {
        self.lines.get(index)
    }

    /// Loop that starts or ends at `index`
    pub fn loop_at(&self, index: usize) -> Option<LoopSpan> {
        self.loops.get(index).copied().flatten()
    }

    /// All loops, in order of their `startloop`
    pub fn loops(&self) -> impl Iterator<Item = LoopSpan> + '_ {
        self.loops
            .iter()
            .enumerate()
            .filter_map(|(index, span)| span.filter(|span| span.begin == index))
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the script has no instructions
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl FromStr for Script {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn syntax(line: usize, token: &str, reason: impl Into<String>) -> ScriptError {
    ScriptError::Syntax {
        line,
        token: token.to_string(),
        reason: reason.into(),
    }
}

/// Tokens of one instruction, consumed front to back
struct Tokens<'a> {
    line: usize,
    keyword: &'a str,
    rest: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn next(&mut self, what: &str) -> Result<&'a str, ScriptError> {
        self.rest
            .next()
            .ok_or_else(|| syntax(self.line, self.keyword, format!("expected {}", what)))
    }

    fn uint(&mut self, what: &str) -> Result<u32, ScriptError> {
        let token = self.next(what)?;
        token.parse().map_err(|_| {
            syntax(
                self.line,
                token,
                format!("expected {} as an unsigned integer", what),
            )
        })
    }

    fn duration(&mut self) -> Result<Option<HoldTime>, ScriptError> {
        match self.rest.next() {
            None => Ok(None),
            Some(token) => token
                .parse()
                .map(Some)
                .map_err(|e: String| syntax(self.line, token, e)),
        }
    }

    fn finish(mut self) -> Result<(), ScriptError> {
        match self.rest.next() {
            None => Ok(()),
            Some(token) => Err(syntax(self.line, token, "unexpected argument")),
        }
    }
}

fn parse_line(line: usize, text: &str) -> Result<Instruction, ScriptError> {
    if text == "!AUTO" {
        return Ok(Instruction::SignalAuto);
    }
    if text.starts_with('!') || text.starts_with('?') {
        return Ok(Instruction::Raw(text.to_string()));
    }

    let mut parts = text.split_whitespace();
    let keyword = parts.next().unwrap_or_default();
    let mut tokens = Tokens {
        line,
        keyword,
        rest: parts,
    };

    let instruction = match keyword {
        "frequency" => Instruction::SetFrequency(tokens.uint("a frequency in Hz")?),
        "gain" => Instruction::SetGain(tokens.uint("a gain in percent")?),
        "on" => Instruction::SignalOn,
        "off" => Instruction::SignalOff,
        "auto" | "AUTO" => Instruction::SignalAuto,
        "hold" => match tokens.duration()? {
            Some(time) => Instruction::Hold(time),
            None => return Err(syntax(line, keyword, "expected a duration")),
        },
        "ramp_freq" => {
            let center = tokens.uint("a center frequency")?;
            let half_range = tokens.uint("a half range")?;
            let step = tokens.uint("a step")?;
            let hold_on = tokens.duration()?.unwrap_or(DEFAULT_RAMP_HOLD_ON);
            let hold_off = tokens.duration()?.unwrap_or_else(HoldTime::zero);
            Instruction::RampFreq {
                center,
                half_range,
                step,
                hold_on,
                hold_off,
            }
        }
        "ramp_freq_range" => {
            let start = tokens.uint("a start frequency")?;
            let stop = tokens.uint("a stop frequency")?;
            let step = tokens.uint("a step")?;
            let hold_on = tokens.duration()?.unwrap_or(DEFAULT_RAMP_HOLD_ON);
            let hold_off = tokens.duration()?.unwrap_or_else(HoldTime::zero);
            Instruction::RampFreqRange(RampArgs {
                start,
                stop,
                step,
                hold_on,
                hold_off,
            })
        }
        "startloop" => {
            let count = match tokens.rest.next() {
                None | Some("inf") => LoopCount::Infinite,
                Some(token) => LoopCount::Times(token.parse().map_err(|_| {
                    syntax(line, token, "expected a loop count or 'inf'")
                })?),
            };
            Instruction::LoopBegin(count)
        }
        "endloop" => Instruction::LoopEnd,
        other => return Err(syntax(line, other, "unknown instruction")),
    };
    tokens.finish()?;
    Ok(instruction)
}

fn resolve_loops(lines: &[ScriptLine]) -> Result<Vec<Option<LoopSpan>>, ScriptError> {
    let mut loops = vec![None; lines.len()];
    let mut open: Vec<(usize, LoopCount)> = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        match line.instruction {
            Instruction::LoopBegin(count) => open.push((index, count)),
            Instruction::LoopEnd => {
                let (begin, count) = open
                    .pop()
                    .ok_or_else(|| syntax(line.line, "endloop", "endloop without startloop"))?;
                let span = LoopSpan {
                    begin,
                    end: index,
                    count,
                };
                loops[begin] = Some(span);
                loops[index] = Some(span);
            }
            _ => {}
        }
    }

    match open.pop() {
        Some((begin, _)) => Err(syntax(
            lines[begin].line,
            "startloop",
            "startloop without endloop",
        )),
        None => Ok(loops),
    }
}
