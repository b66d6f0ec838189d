// Step-segmented output parser
//
// Step-by-step generations interleave <thought>...</thought> and
// <text>...</text> blocks. Models routinely drop closing tags or emit text
// outside any block, so parsing is a small state machine with explicit
// recovery rules rather than a pattern match:
//
//   Idle      --<thought>-->  InThought   (pushes the current segment if it has content)
//   InThought --<text>----->  InText      (implicit </thought>)
//   Idle      --<text>----->  InText      (new segment if the current one already has text)
//   any       --</thought>->  Idle        (ignored unless InThought)
//   any       --</text>---->  Idle        (ignored unless InText)
//
// Text seen while Idle belongs to the current segment's text. End of input
// flushes whatever is buffered. Tags match case-insensitively.

use crate::graph::ReasoningStep;

const OPEN_THOUGHT: &str = "<thought>";
const CLOSE_THOUGHT: &str = "</thought>";
const OPEN_TEXT: &str = "<text>";
const CLOSE_TEXT: &str = "</text>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Idle,
    InThought,
    InText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    OpenThought,
    CloseThought,
    OpenText,
    CloseText,
}

impl Tag {
    const ALL: [(Tag, &'static str); 4] = [
        (Tag::OpenThought, OPEN_THOUGHT),
        (Tag::CloseThought, CLOSE_THOUGHT),
        (Tag::OpenText, OPEN_TEXT),
        (Tag::CloseText, CLOSE_TEXT),
    ];

    /// Recognize a tag at the start of `rest`.
    fn at(rest: &str) -> Option<(Tag, usize)> {
        Self::ALL.iter().find_map(|(tag, literal)| {
            rest.get(..literal.len())
                .filter(|candidate| candidate.eq_ignore_ascii_case(literal))
                .map(|_| (*tag, literal.len()))
        })
    }
}

/// Result of parsing a step-segmented generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTrace {
    pub segments: Vec<ReasoningStep>,
    /// False when no usable tag structure was found and the whole output
    /// became one untraced segment
    pub traced: bool,
}

impl ParsedTrace {
    /// Final document text: segment texts separated by blank lines.
    pub fn content(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Segments worth storing as a reasoning trace.
    pub fn reasoning(&self) -> Option<Vec<ReasoningStep>> {
        self.traced.then(|| self.segments.clone())
    }
}

struct TraceMachine {
    state: ParseState,
    buffer: String,
    current: ReasoningStep,
    segments: Vec<ReasoningStep>,
    saw_tag: bool,
}

impl TraceMachine {
    fn new() -> Self {
        Self {
            state: ParseState::Idle,
            buffer: String::new(),
            current: ReasoningStep::default(),
            segments: Vec::new(),
            saw_tag: false,
        }
    }

    fn flush(&mut self) {
        let chunk = self.buffer.trim();
        if !chunk.is_empty() {
            let target = match self.state {
                ParseState::InThought => &mut self.current.thought,
                ParseState::InText | ParseState::Idle => &mut self.current.text,
            };
            if !target.is_empty() {
                target.push('\n');
            }
            target.push_str(chunk);
        }
        self.buffer.clear();
    }

    fn push_segment(&mut self) {
        if !self.current.thought.is_empty() || !self.current.text.is_empty() {
            self.segments.push(std::mem::take(&mut self.current));
        }
    }

    fn on_tag(&mut self, tag: Tag) {
        self.saw_tag = true;
        self.flush();
        self.state = match (self.state, tag) {
            (_, Tag::OpenThought) => {
                self.push_segment();
                ParseState::InThought
            }
            (ParseState::InThought, Tag::OpenText) => ParseState::InText,
            (_, Tag::OpenText) => {
                if !self.current.text.is_empty() {
                    self.push_segment();
                }
                ParseState::InText
            }
            (ParseState::InThought, Tag::CloseThought) => ParseState::Idle,
            (ParseState::InText, Tag::CloseText) => ParseState::Idle,
            // Unmatched closing tag
            (state, Tag::CloseThought | Tag::CloseText) => state,
        };
    }

    fn finish(mut self) -> (Vec<ReasoningStep>, bool) {
        self.flush();
        self.push_segment();
        (self.segments, self.saw_tag)
    }
}

/// Parse step-segmented output, never losing content.
pub fn parse_trace(raw: &str) -> ParsedTrace {
    let mut machine = TraceMachine::new();
    let mut rest = raw;

    while let Some(pos) = rest.find('<') {
        machine.buffer.push_str(&rest[..pos]);
        let at_bracket = &rest[pos..];
        match Tag::at(at_bracket) {
            Some((tag, len)) => {
                machine.on_tag(tag);
                rest = &at_bracket[len..];
            }
            None => {
                machine.buffer.push('<');
                rest = &at_bracket[1..];
            }
        }
    }
    machine.buffer.push_str(rest);

    let (segments, saw_tag) = machine.finish();
    if saw_tag && segments.iter().any(|s| !s.text.is_empty()) {
        return ParsedTrace {
            segments,
            traced: true,
        };
    }

    ParsedTrace {
        segments: vec![ReasoningStep {
            thought: String::new(),
            text: strip_tags(raw),
        }],
        traced: false,
    }
}

/// Remove every recognized tag, keeping the text between them.
fn strip_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('<') {
        out.push_str(&rest[..pos]);
        let at_bracket = &rest[pos..];
        match Tag::at(at_bracket) {
            Some((_, len)) => rest = &at_bracket[len..],
            None => {
                out.push('<');
                rest = &at_bracket[1..];
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}
