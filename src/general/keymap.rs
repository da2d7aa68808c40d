use std::collections::HashMap;

/// Default layout: number row and letters, low to high.
/// Shifted number-row glyphs share the base note of their physical key.
const DEFAULT_LAYOUT: &[(&[char], u8)] = &[
    (&['1', '!'], 36),
    (&['2', '@'], 38),
    (&['3', '#'], 40),
    (&['4', '$'], 41),
    (&['5', '%'], 43),
    (&['6', '^'], 45),
    (&['7', '&'], 47),
    (&['8', '*'], 48),
    (&['9', '('], 50),
    (&['0', ')'], 52),
    (&['Q'], 53),
    (&['W'], 55),
    (&['E'], 57),
    (&['R'], 59),
    (&['T'], 60),
    (&['Y'], 62),
    (&['U'], 64),
    (&['I'], 65),
    (&['O'], 67),
    (&['P'], 69),
    (&['A'], 71),
    (&['S'], 72),
    (&['D'], 74),
    (&['F'], 76),
    (&['G'], 77),
    (&['H'], 79),
    (&['J'], 81),
    (&['K'], 83),
    (&['L'], 84),
    (&['Z'], 86),
    (&['X'], 88),
    (&['C'], 89),
    (&['V'], 91),
    (&['B'], 93),
    (&['N'], 95),
    (&['M'], 96),
];

/// Fold a key glyph to the spelling used in the table.
pub fn normalize_symbol(symbol: char) -> char {
    symbol.to_ascii_uppercase()
}

/// Static table from a key glyph to its unshifted base note.
#[derive(Debug, Clone)]
pub struct NoteMapper {
    table: HashMap<char, u8>,
    // shifted glyph -> unshifted glyph of the same physical key
    aliases: HashMap<char, char>,
}

impl NoteMapper {
    /// Build a mapper from explicit entries, with no glyph aliases. Later
    /// entries win.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (char, u8)>,
    {
        let table = entries
            .into_iter()
            .map(|(symbol, note)| (normalize_symbol(symbol), note))
            .collect();
        Self {
            table,
            aliases: HashMap::new(),
        }
    }

    /// Default layout with `overrides` applied on top.
    pub fn with_overrides<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (char, u8)>,
    {
        let defaults = DEFAULT_LAYOUT
            .iter()
            .flat_map(|(glyphs, note)| glyphs.iter().map(move |g| (*g, *note)));
        let overrides: Vec<(char, u8)> = overrides.into_iter().collect();
        let mut mapper = Self::from_entries(defaults.chain(overrides.iter().copied()));

        for (glyphs, _) in DEFAULT_LAYOUT {
            if let Some((primary, rest)) = glyphs.split_first() {
                for glyph in rest {
                    mapper.aliases.insert(*glyph, *primary);
                }
            }
        }
        // an overridden glyph stands on its own
        for (symbol, _) in &overrides {
            mapper.aliases.remove(&normalize_symbol(*symbol));
        }
        mapper
    }

    pub fn base_note(&self, symbol: char) -> Option<u8> {
        self.table.get(&normalize_symbol(symbol)).copied()
    }

    /// Identify the physical key behind a glyph, so that `1` and `!` are the
    /// same key regardless of the shift state at the time.
    pub fn physical_key(&self, symbol: char) -> char {
        let symbol = normalize_symbol(symbol);
        self.aliases.get(&symbol).copied().unwrap_or(symbol)
    }

    pub fn is_mapped(&self, symbol: char) -> bool {
        self.base_note(symbol).is_some()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for NoteMapper {
    fn default() -> Self {
        Self::with_overrides(std::iter::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifted_digits_alias_their_physical_key() {
        let mapper = NoteMapper::default();
        let pairs = [
            ('1', '!'),
            ('2', '@'),
            ('3', '#'),
            ('4', '$'),
            ('5', '%'),
            ('6', '^'),
            ('7', '&'),
            ('8', '*'),
            ('9', '('),
            ('0', ')'),
        ];
        for (plain, shifted) in pairs {
            assert_eq!(
                mapper.base_note(plain),
                mapper.base_note(shifted),
                "{} and {} should share a base note",
                plain,
                shifted
            );
        }
    }

    #[test]
    fn letters_are_case_insensitive() {
        let mapper = NoteMapper::default();
        assert_eq!(mapper.base_note('t'), Some(60));
        assert_eq!(mapper.base_note('T'), Some(60));
        assert_eq!(mapper.base_note('m'), Some(96));
    }

    #[test]
    fn default_table_covers_both_rows() {
        let mapper = NoteMapper::default();
        // 10 digits, 10 shifted digits, 26 letters
        assert_eq!(mapper.len(), 46);
        assert_eq!(mapper.base_note('1'), Some(36));
        assert_eq!(mapper.base_note('0'), Some(52));
        assert_eq!(mapper.base_note('Q'), Some(53));
    }

    #[test]
    fn unmapped_symbols_resolve_to_none() {
        let mapper = NoteMapper::default();
        assert_eq!(mapper.base_note(' '), None);
        assert_eq!(mapper.base_note('-'), None);
        assert!(!mapper.is_mapped(';'));
    }

    #[test]
    fn shifted_glyph_resolves_to_its_physical_key() {
        let mapper = NoteMapper::default();
        assert_eq!(mapper.physical_key('!'), '1');
        assert_eq!(mapper.physical_key('1'), '1');
        assert_eq!(mapper.physical_key('q'), 'Q');
        assert_eq!(mapper.physical_key(';'), ';');
    }

    #[test]
    fn overrides_replace_defaults() {
        let mapper = NoteMapper::with_overrides([('q', 0), (';', 100)]);
        assert_eq!(mapper.base_note('Q'), Some(0));
        assert_eq!(mapper.base_note(';'), Some(100));
        assert_eq!(mapper.base_note('W'), Some(55));
    }
}
