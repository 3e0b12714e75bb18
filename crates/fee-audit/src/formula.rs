//! Structural spreadsheet formulas
//!
//! The layout describes formulas in terms of section-relative cells; they
//! become A1 strings only when the section's absolute origin is known.

use rust_decimal::Decimal;

/// Column letter for a zero-based column index (0 -> A, 26 -> AA)
pub fn column_letter(col: u16) -> String {
    let mut n = u32::from(col) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(char::from(b'A' + rem));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Zero-based column index for a column letter (`"A"` -> 0)
pub fn column_index(letters: &str) -> Option<u16> {
    let letters = letters.trim();
    if letters.is_empty() {
        return None;
    }
    let mut n: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        n = n * 26 + u32::from(c.to_ascii_uppercase() as u8 - b'A' + 1);
        if n > u32::from(u16::MAX) {
            return None;
        }
    }
    u16::try_from(n - 1).ok()
}

/// A cell addressed relative to the first row of its section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub offset: u32,
    pub col: u16,
}

impl CellRef {
    pub fn new(offset: u32, col: u16) -> Self {
        Self { offset, col }
    }

    /// A1 reference once the section origin (zero-based sheet row) is known
    pub fn to_a1(self, origin: u32) -> String {
        format!("{}{}", column_letter(self.col), origin + self.offset + 1)
    }
}

/// A rectangular block of cells, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: CellRef,
    pub end: CellRef,
}

impl Span {
    /// Cells `first_col..=last_col` of one row
    pub fn across(offset: u32, first_col: u16, last_col: u16) -> Self {
        Self {
            start: CellRef::new(offset, first_col),
            end: CellRef::new(offset, last_col),
        }
    }

    /// Rows `first..=last` of one column
    pub fn down(col: u16, first: u32, last: u32) -> Self {
        Self {
            start: CellRef::new(first, col),
            end: CellRef::new(last, col),
        }
    }

    /// Number of cells covered
    #[cfg(test)]
    pub fn cell_count(&self) -> usize {
        let rows = self.end.offset.abs_diff(self.start.offset) as usize + 1;
        let cols = self.end.col.abs_diff(self.start.col) as usize + 1;
        rows * cols
    }

    pub fn cells(&self) -> Vec<CellRef> {
        let (r0, r1) = (self.start.offset.min(self.end.offset), self.start.offset.max(self.end.offset));
        let (c0, c1) = (self.start.col.min(self.end.col), self.start.col.max(self.end.col));
        (r0..=r1)
            .flat_map(|offset| (c0..=c1).map(move |col| CellRef::new(offset, col)))
            .collect()
    }

    fn to_a1(self, origin: u32) -> String {
        if self.start == self.end {
            self.start.to_a1(origin)
        } else {
            format!("{}:{}", self.start.to_a1(origin), self.end.to_a1(origin))
        }
    }
}

/// Formula expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    Number(Decimal),
    Cell(CellRef),
    Sum(Vec<Span>),
    Add(Box<Formula>, Box<Formula>),
    Sub(Box<Formula>, Box<Formula>),
    Mul(Box<Formula>, Box<Formula>),
    Div(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn cell(offset: u32, col: u16) -> Self {
        Formula::Cell(CellRef::new(offset, col))
    }

    pub fn number(n: impl Into<Decimal>) -> Self {
        Formula::Number(n.into())
    }

    pub fn sum(spans: Vec<Span>) -> Self {
        Formula::Sum(spans)
    }

    pub fn plus(self, rhs: Formula) -> Self {
        Formula::Add(Box::new(self), Box::new(rhs))
    }

    pub fn minus(self, rhs: Formula) -> Self {
        Formula::Sub(Box::new(self), Box::new(rhs))
    }

    pub fn times(self, rhs: Formula) -> Self {
        Formula::Mul(Box::new(self), Box::new(rhs))
    }

    pub fn over(self, rhs: Formula) -> Self {
        Formula::Div(Box::new(self), Box::new(rhs))
    }

    /// Spans summed by a top-level `SUM`, empty for any other shape
    #[cfg(test)]
    pub fn summed_spans(&self) -> &[Span] {
        match self {
            Formula::Sum(spans) => spans,
            _ => &[],
        }
    }

    /// Every cell the formula reads
    pub fn references(&self) -> Vec<CellRef> {
        match self {
            Formula::Number(_) => Vec::new(),
            Formula::Cell(cell) => vec![*cell],
            Formula::Sum(spans) => spans.iter().flat_map(Span::cells).collect(),
            Formula::Add(a, b) | Formula::Sub(a, b) | Formula::Mul(a, b) | Formula::Div(a, b) => {
                let mut refs = a.references();
                refs.extend(b.references());
                refs
            }
        }
    }

    /// Formula string (with leading `=`) for a section starting at `origin`
    pub fn render(&self, origin: u32) -> String {
        format!("={}", self.expr(origin))
    }

    fn expr(&self, origin: u32) -> String {
        match self {
            Formula::Number(n) => n.normalize().to_string(),
            Formula::Cell(cell) => cell.to_a1(origin),
            Formula::Sum(spans) => {
                let args: Vec<String> = spans.iter().map(|s| s.to_a1(origin)).collect();
                format!("SUM({})", args.join(","))
            }
            Formula::Add(a, b) => format!("{}+{}", a.expr(origin), b.expr(origin)),
            Formula::Sub(a, b) => format!("{}-{}", a.expr(origin), b.operand(origin)),
            Formula::Mul(a, b) => format!("{}*{}", a.operand(origin), b.operand(origin)),
            Formula::Div(a, b) => format!("{}/{}", a.operand(origin), b.operand(origin)),
        }
    }

    /// Expression wrapped in parentheses when it would bind too loosely
    fn operand(&self, origin: u32) -> String {
        match self {
            Formula::Add(..) | Formula::Sub(..) => format!("({})", self.expr(origin)),
            _ => self.expr(origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(10), "K");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_column_index_inverts_letter() {
        for col in [0u16, 5, 25, 26, 51, 701, 702] {
            assert_eq!(column_index(&column_letter(col)), Some(col));
        }
        assert_eq!(column_index("k"), Some(10));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn test_render_moves_with_origin() {
        let row_total = Formula::sum(vec![Span::across(3, 1, 5)]);
        assert_eq!(row_total.render(0), "=SUM(B4:F4)");
        assert_eq!(row_total.render(49), "=SUM(B53:F53)");
    }

    #[test]
    fn test_render_precedence() {
        let running = Formula::number(5).times(Formula::number(dec!(140.00))).plus(Formula::number(65));
        assert_eq!(running.render(0), "=5*140+65");

        let revenue = Formula::cell(3, 8).minus(Formula::sum(vec![Span::down(1, 4, 9)]));
        assert_eq!(revenue.render(0), "=I4-SUM(B5:B10)");

        let grouped = Formula::cell(0, 0).minus(Formula::cell(0, 1).plus(Formula::cell(0, 2)));
        assert_eq!(grouped.render(0), "=A1-(B1+C1)");

        let rate = Formula::cell(0, 0).plus(Formula::cell(0, 1)).over(Formula::number(5));
        assert_eq!(rate.render(0), "=(A1+B1)/5");
    }

    #[test]
    fn test_single_cell_span_renders_as_cell() {
        let total = Formula::sum(vec![Span::down(6, 3, 3), Span::down(6, 4, 9)]);
        assert_eq!(total.render(0), "=SUM(G4,G5:G10)");
        let counted: usize = total.summed_spans().iter().map(Span::cell_count).sum();
        assert_eq!(counted, 7);
        assert_eq!(total.references().len(), 7);
    }
}
