use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Conversion between label ids and text.
pub trait LabelCodec: Send + Sync {
    /// Map label ids to text. Ids outside the alphabet (the CTC blank, padding) are dropped.
    fn labels_to_text(&self, labels: &[i64]) -> String;

    /// Map text to label ids, skipping characters outside the alphabet.
    fn text_to_labels(&self, text: &str) -> Vec<i64>;

    /// Id -> character index used to read attention decoder outputs,
    /// including the end-of-sequence sentinel.
    fn reverse_char_index(&self) -> &HashMap<i64, char>;

    /// Number of output classes: the alphabet plus one blank / sentinel slot.
    fn num_classes(&self) -> usize;
}

/// Codec over a fixed alphabet. Id `letters.len()` is the CTC blank for CTC
/// models and the end-of-sequence sentinel for attention models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphabetCodec {
    letters: Vec<char>,
    char_to_id: HashMap<char, i64>,
    id_to_char: HashMap<i64, char>,
    eos_char: char,
}

impl AlphabetCodec {
    pub fn new(letters: &[char], eos_char: char) -> Self {
        let mut char_to_id = HashMap::new();
        let mut id_to_char = HashMap::new();

        for (id, &ch) in letters.iter().enumerate() {
            char_to_id.entry(ch).or_insert(id as i64);
            id_to_char.insert(id as i64, ch);
        }
        id_to_char.insert(letters.len() as i64, eos_char);

        Self {
            letters: letters.to_vec(),
            char_to_id,
            id_to_char,
            eos_char,
        }
    }

    pub fn from_letters(letters: &str, eos_char: char) -> Self {
        let letters: Vec<char> = letters.chars().collect();
        Self::new(&letters, eos_char)
    }

    pub fn letters(&self) -> &[char] {
        &self.letters
    }

    pub fn blank_id(&self) -> i64 {
        self.letters.len() as i64
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .with_context(|| "Failed to serialize label codec")?;

        fs::write(path, json)
            .with_context(|| format!("Failed to write label codec to {:?}", path))?;

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read label codec from {:?}", path))?;

        let codec: Self = serde_json::from_str(&json)
            .with_context(|| "Failed to deserialize label codec")?;

        Ok(codec)
    }
}

impl LabelCodec for AlphabetCodec {
    fn labels_to_text(&self, labels: &[i64]) -> String {
        labels
            .iter()
            .filter(|&&id| id >= 0 && (id as usize) < self.letters.len())
            .map(|&id| self.letters[id as usize])
            .collect()
    }

    fn text_to_labels(&self, text: &str) -> Vec<i64> {
        text.chars()
            .filter_map(|ch| self.char_to_id.get(&ch).copied())
            .collect()
    }

    fn reverse_char_index(&self) -> &HashMap<i64, char> {
        &self.id_to_char
    }

    fn num_classes(&self) -> usize {
        self.letters.len() + 1
    }
}
