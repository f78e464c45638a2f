// Error-path tracking.
//
// Every scope keeps a stack of path frames describing where evaluation currently
// is. The last frame is the active one; plain key and index descent pushes segments
// onto it. Following a reference into another part of the tree pushes a whole new
// frame flagged as right-hand side, so a diagnostic can show both the place being
// written and the place the value was read from.
//
// Push operations hand back a `PathMark`; restoring a mark truncates the stack to
// exactly the depth it had before the push. The evaluator restores marks on both the
// success and the failure path.

use std::fmt;

/// One frame of the error path: a key path plus whether it names a value being read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathFrame {
    pub segments: Vec<String>,
    pub rhs: bool,
}

impl PathFrame {
    pub fn new(segments: Vec<String>) -> Self {
        PathFrame {
            segments,
            rhs: false,
        }
    }

    pub fn rhs(segments: Vec<String>) -> Self {
        PathFrame { segments, rhs: true }
    }

    /// Dotted rendering of the frame's segments.
    pub fn joined(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for PathFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rhs {
            write!(f, "<- {}", self.joined())
        } else {
            write!(f, "{}", self.joined())
        }
    }
}

/// Depth recorded before a push; see [`ErrorPaths::restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathMark {
    frames: usize,
    segments: usize,
}

/// The ordered stack of path frames owned by a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPaths {
    frames: Vec<PathFrame>,
}

impl Default for ErrorPaths {
    fn default() -> Self {
        ErrorPaths {
            frames: vec![PathFrame::default()],
        }
    }
}

impl ErrorPaths {
    pub fn new() -> Self {
        Self::default()
    }

    fn mark(&self) -> PathMark {
        PathMark {
            frames: self.frames.len(),
            segments: self.frames.last().map_or(0, |f| f.segments.len()),
        }
    }

    /// The active frame. There is always at least one.
    pub fn current(&self) -> &PathFrame {
        // The stack is never emptied below its root frame
        &self.frames[self.frames.len() - 1]
    }

    fn current_mut(&mut self) -> &mut PathFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Append a segment to the active frame.
    pub fn push_segment(&mut self, segment: impl Into<String>) -> PathMark {
        let mark = self.mark();
        self.current_mut().segments.push(segment.into());
        mark
    }

    /// Start a new frame.
    pub fn push_frame(&mut self, frame: PathFrame) -> PathMark {
        let mark = self.mark();
        self.frames.push(frame);
        mark
    }

    /// Return to the depth recorded in `mark`.
    pub fn restore(&mut self, mark: PathMark) {
        self.frames.truncate(mark.frames.max(1));
        let frame = self.current_mut();
        frame.segments.truncate(mark.segments);
    }

    /// Dotted rendering of the active frame.
    pub fn current_path(&self) -> String {
        self.current().joined()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// A copy of the whole stack, used when an error is raised.
    pub fn snapshot(&self) -> Vec<PathFrame> {
        self.frames.clone()
    }
}
