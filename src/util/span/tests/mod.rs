//! Span unit tests

use crate::util::span::{Position, Span};

#[cfg(test)]
mod position_tests {
    use super::*;

    #[test]
    fn test_position_creation() {
        let pos = Position::new(3, 7);
        assert_eq!(pos.line, 3);
        assert_eq!(pos.column, 7);
        assert_eq!(format!("{}", pos), "3:7");
    }

    #[test]
    fn test_position_dummy() {
        assert_eq!(Position::dummy(), Position::default());
    }
}

#[cfg(test)]
mod span_tests {
    use super::*;

    #[test]
    fn test_span_point_display() {
        let span = Span::point("scene.anim", 12, 4);
        assert_eq!(span.start, span.end);
        assert_eq!(format!("{}", span), "scene.anim:12:4");
    }

    #[test]
    fn test_span_dummy() {
        let span = Span::dummy();
        assert!(span.is_dummy());
        assert_eq!(format!("{}", span), "<unknown>");
    }

    #[test]
    fn test_span_caller_points_here() {
        let span = Span::caller();
        assert!(span.file.ends_with("mod.rs"));
        assert_eq!(span.start.line, line!() - 2);
    }
}
