/// A region of the source text, as byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A zero-width span, useful to point at the end of the input
    pub fn marker(at: usize) -> Self {
        Self::new(at, at)
    }

    /// The span of a single byte
    pub fn single(at: usize) -> Self {
        Self::new(at, at + 1)
    }

    /// The smallest span covering `self` and `other`
    pub fn to(self, other: Span) -> Self {
        Self::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        (span.start, span.end.saturating_sub(span.start)).into()
    }
}
