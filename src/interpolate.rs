// Interpolation engine
//
// A single left-to-right scan over a scalar string. `$`, `=` and `^` arm detection;
// the next character decides whether a substitution opens (`{`, `(` or, for the
// unbraced forms, anything else) or whether the trigger was literal text. Open
// substitutions nest as a stack of frames. Closing a frame resolves its text through
// the caller-supplied `Substitutions` and either feeds the result to the enclosing
// frame or, at top level, appends it to the output.

use crate::errors::EvaluatorError;
use crate::value::{Map, Value};

/// Context passed along with a reference lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookup {
    /// The substitution text as it appeared in the source, for diagnostics.
    pub source: String,
}

/// Resolution capabilities the engine needs from its caller.
pub trait Substitutions {
    fn dereference(&mut self, path: &str, lookup: &Lookup) -> Result<Value, EvaluatorError>;
    /// Evaluate a mapping produced inside a substitution as a nested document.
    fn call(&mut self, mapping: &Value) -> Result<Value, EvaluatorError>;
    fn fetch(&mut self, locator: &str) -> Result<Value, EvaluatorError>;
    /// Variable snapshot handed to the math evaluator.
    fn bindings(&mut self) -> Map;
    fn math(&mut self, expression: &str, bindings: &Map) -> Result<Value, EvaluatorError>;
    fn shell(&mut self, command: &str) -> Result<Value, EvaluatorError>;
}

/// Result of interpolating one scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolated {
    pub value: Value,
    /// True when at least one top-level substitution produced a truthy result.
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Reference,
    Shell,
    Fetch,
    Math,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    /// Unbraced `$name`: ends at whitespace.
    Space,
    /// Unbraced `=expr` / `^locator`: ends at end of input or the enclosing close.
    End,
    Char(char),
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Value(Value),
}

fn push_char(segments: &mut Vec<Segment>, c: char) {
    if let Some(Segment::Text(text)) = segments.last_mut() {
        text.push(c);
    } else {
        segments.push(Segment::Text(c.to_string()));
    }
}

fn pop_char(segments: &mut Vec<Segment>) {
    if let Some(Segment::Text(text)) = segments.last_mut() {
        text.pop();
        if text.is_empty() {
            segments.pop();
        }
    }
}

fn buffer_is_empty(segments: &[Segment]) -> bool {
    segments.is_empty()
}

fn ends_with_whitespace(segments: &[Segment]) -> bool {
    match segments.last() {
        Some(Segment::Text(text)) => text.chars().last().map_or(false, char::is_whitespace),
        _ => false,
    }
}

/// One segment becomes its value; several are joined as text.
fn reduce(segments: Vec<Segment>) -> Value {
    if segments.len() == 1 {
        if let Some(segment) = segments.into_iter().next() {
            return match segment {
                Segment::Text(text) => Value::from(text),
                Segment::Value(value) => value,
            };
        }
        return Value::from("");
    }
    let mut text = String::new();
    for segment in &segments {
        match segment {
            Segment::Text(t) => text.push_str(t),
            Segment::Value(v) => text.push_str(&v.to_text()),
        }
    }
    Value::from(text)
}

#[derive(Debug, Clone, Copy)]
struct Detecting {
    trigger: char,
    /// Whether an unbraced substitution may open here.
    unbraced: bool,
}

/// Scratch state of one open (or not yet opened) substitution.
#[derive(Debug, Default)]
struct Frame {
    operator: Option<Operator>,
    terminal: Option<Terminal>,
    escaping: bool,
    detecting: Option<Detecting>,
    raw: Vec<Segment>,
    substitution: Vec<Segment>,
    source: String,
}

impl Frame {
    fn buffer(&mut self) -> &mut Vec<Segment> {
        if self.operator.is_some() {
            &mut self.substitution
        } else {
            &mut self.raw
        }
    }

    fn append(&mut self, c: char) {
        if self.operator.is_some() {
            self.source.push(c);
        }
        push_char(self.buffer(), c);
    }
}

struct Expansion<'s, S: Substitutions + ?Sized> {
    subs: &'s mut S,
    /// Finished top-level output segments.
    completed: Vec<Segment>,
    /// The open nesting stack; index 0 is the top-level frame.
    active: Vec<Frame>,
    changed: bool,
    /// Whether anything has been emitted at top level yet.
    started: bool,
}

impl<'s, S: Substitutions + ?Sized> Expansion<'s, S> {
    fn new(subs: &'s mut S) -> Self {
        Expansion {
            subs,
            completed: Vec::new(),
            active: vec![Frame::default()],
            changed: false,
            started: false,
        }
    }

    fn ptr(&mut self) -> &mut Frame {
        let last = self.active.len() - 1;
        &mut self.active[last]
    }

    fn in_substitution(&self) -> bool {
        self.active.last().map_or(false, |f| f.operator.is_some())
    }

    fn arm(&mut self, trigger: char) {
        let inside = self.in_substitution();
        let started = self.started;
        let frame = self.ptr();
        let unbraced = match trigger {
            '$' => {
                !inside && (buffer_is_empty(&frame.raw) || ends_with_whitespace(&frame.raw))
            }
            _ => {
                if inside {
                    buffer_is_empty(&frame.substitution)
                } else {
                    !started && buffer_is_empty(&frame.raw)
                }
            }
        };
        frame.detecting = Some(Detecting { trigger, unbraced });
    }

    fn open(&mut self, operator: Operator, terminal: Terminal) {
        let frame = self.ptr();
        pop_char(frame.buffer());
        if frame.operator.is_some() {
            frame.source.pop();
        }
        frame.detecting = None;
        if frame.operator.is_some() {
            self.active.push(Frame::default());
        }
        let frame = self.ptr();
        frame.operator = Some(operator);
        frame.terminal = Some(terminal);
    }

    fn resolve(&mut self, operator: Operator, swap: Value, source: &str) -> Result<Value, EvaluatorError> {
        if swap.is_object() {
            return self.subs.call(&swap);
        }
        let text = swap.to_text();
        let res = match operator {
            Operator::Reference => self.subs.dereference(
                &text,
                &Lookup {
                    source: source.to_string(),
                },
            )?,
            Operator::Shell => self.subs.shell(&text)?,
            Operator::Fetch => self.subs.fetch(&text)?,
            Operator::Math => {
                let bindings = self.subs.bindings();
                self.subs.math(&text, &bindings)?
            }
        };
        if !res.is_truthy() && !res.is_number() {
            return Ok(Value::from(""));
        }
        Ok(res)
    }

    fn close(&mut self) -> Result<(), EvaluatorError> {
        let Some(mut frame) = self.active.pop() else {
            return Ok(());
        };
        let Some(operator) = frame.operator.take() else {
            self.active.push(frame);
            return Ok(());
        };
        frame.terminal = None;
        let substitution = std::mem::take(&mut frame.substitution);
        let res = self.resolve(operator, reduce(substitution), &frame.source)?;

        if !self.active.is_empty() {
            // Nested: the result becomes part of the enclosing substitution's text
            self.ptr().substitution.push(Segment::Value(res));
            self.ptr().source.push_str(&frame.source);
        } else {
            if res.is_truthy() {
                self.changed = true;
            }
            self.completed.append(&mut frame.raw);
            self.completed.push(Segment::Value(res));
            self.started = true;
            self.active.push(Frame::default());
        }
        Ok(())
    }

    /// Handle `}` or `)`.
    fn close_char(&mut self, c: char) -> Result<(), EvaluatorError> {
        loop {
            let frame = self.ptr();
            match (frame.operator, frame.terminal) {
                (Some(_), Some(Terminal::Space)) => self.close()?,
                (Some(_), Some(Terminal::End)) if self.enclosing_terminal(c) => self.close()?,
                _ => break,
            }
        }
        let frame = self.ptr();
        if frame.operator.is_some() && frame.terminal == Some(Terminal::Char(c)) {
            self.close()
        } else {
            frame.append(c);
            Ok(())
        }
    }

    /// Whether a frame below the innermost one is waiting for `c`.
    fn enclosing_terminal(&self, c: char) -> bool {
        let depth = self.active.len();
        depth > 1
            && self.active[..depth - 1]
                .iter()
                .any(|f| f.operator.is_some() && f.terminal == Some(Terminal::Char(c)))
    }

    fn scan(&mut self, template: &str) -> Result<(), EvaluatorError> {
        for c in template.chars() {
            let frame = self.ptr();
            if frame.escaping {
                frame.escaping = false;
                frame.append(c);
                continue;
            }
            let detecting = frame.detecting.take();
            match c {
                '{' => match detecting {
                    Some(d) => {
                        let operator = match d.trigger {
                            '$' => Operator::Reference,
                            '^' => Operator::Fetch,
                            _ => Operator::Math,
                        };
                        self.open(operator, Terminal::Char('}'));
                    }
                    None => frame.append(c),
                },
                '(' => match detecting {
                    Some(d) if d.trigger == '$' => self.open(Operator::Shell, Terminal::Char(')')),
                    _ => frame.append(c),
                },
                '}' | ')' => self.close_char(c)?,
                '\\' => frame.escaping = true,
                c if c.is_whitespace() => {
                    if frame.operator.is_some() && frame.terminal == Some(Terminal::Space) {
                        self.close()?;
                    }
                    self.ptr().append(c);
                }
                _ => {
                    if let Some(d) = detecting.filter(|d| d.unbraced) {
                        let (operator, terminal) = match d.trigger {
                            '$' => (Operator::Reference, Terminal::Space),
                            '^' => (Operator::Fetch, Terminal::End),
                            _ => (Operator::Math, Terminal::End),
                        };
                        self.open(operator, terminal);
                        self.ptr().append(c);
                    } else {
                        // Arm before appending: placement is judged on the text before the trigger
                        if matches!(c, '$' | '=' | '^') {
                            self.arm(c);
                        }
                        self.ptr().append(c);
                    }
                }
            }
        }
        while self.in_substitution() {
            self.close()?;
        }
        Ok(())
    }

    fn finish(mut self) -> Interpolated {
        for mut frame in self.active.drain(..) {
            self.completed.append(&mut frame.raw);
        }
        Interpolated {
            value: reduce(self.completed),
            changed: self.changed,
        }
    }
}

/// Interpolate a scalar. Non-strings come back unchanged.
pub fn interpolate<S: Substitutions + ?Sized>(
    input: &Value,
    subs: &mut S,
) -> Result<Interpolated, EvaluatorError> {
    let Value::String(template) = input else {
        return Ok(Interpolated {
            value: input.clone(),
            changed: false,
        });
    };
    let mut expansion = Expansion::new(subs);
    expansion.scan(template)?;
    Ok(expansion.finish())
}
