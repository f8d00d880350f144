use crate::PaletteError;
use std::path::Path;

/// Class-id to display-color table.
///
/// Loaded once at startup from a JSON file holding a `(K, 3)` array of RGB
/// triples in 0-255, one row per class id. Immutable after load; may cover
/// a superset of the classes a particular model run is allowed to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    /// Load a palette from a JSON file.
    ///
    /// # Errors
    ///
    /// `PaletteError::Io` if the file cannot be read, `PaletteError::Malformed`
    /// if the contents are not a non-empty array of RGB triples in 0-255.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PaletteError> {
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Parse a palette from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PaletteError> {
        let colors: Vec<[u8; 3]> = serde_json::from_slice(bytes)
            .map_err(|e| PaletteError::Malformed(e.to_string()))?;
        Self::from_colors(colors)
    }

    /// Build a palette from in-memory colors.
    pub fn from_colors(colors: Vec<[u8; 3]>) -> Result<Self, PaletteError> {
        if colors.is_empty() {
            return Err(PaletteError::Malformed("palette is empty".to_string()));
        }
        Ok(Self { colors })
    }

    /// Number of colors in the table.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color for a class id, if the table covers it.
    pub fn color(&self, class_id: usize) -> Option<[u8; 3]> {
        self.colors.get(class_id).copied()
    }

    pub(crate) fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_parses_triples() {
        let palette = Palette::from_slice(b"[[0,0,0],[255,0,0],[0,255,0]]").unwrap();
        assert_eq!(palette.len(), 3);
        assert_eq!(palette.color(1), Some([255, 0, 0]));
        assert_eq!(palette.color(3), None);
    }

    #[test]
    fn test_from_slice_rejects_wrong_row_length() {
        let result = Palette::from_slice(b"[[0,0,0],[255,0]]");
        assert!(matches!(result, Err(PaletteError::Malformed(_))));
    }

    #[test]
    fn test_from_slice_rejects_out_of_range_component() {
        let result = Palette::from_slice(b"[[0,0,256]]");
        assert!(matches!(result, Err(PaletteError::Malformed(_))));
    }

    #[test]
    fn test_from_slice_rejects_empty_table() {
        let result = Palette::from_slice(b"[]");
        assert!(matches!(result, Err(PaletteError::Malformed(_))));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = Palette::load("/nonexistent/palette.json");
        assert!(matches!(result, Err(PaletteError::Io(_))));
    }

    #[test]
    fn test_load_reads_file() {
        let path = std::env::temp_dir().join(format!("sema-palette-{}.json", std::process::id()));
        std::fs::write(&path, b"[[1,2,3],[4,5,6]]").unwrap();
        let palette = Palette::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(palette.color(0), Some([1, 2, 3]));
        assert_eq!(palette.color(1), Some([4, 5, 6]));
    }
}
