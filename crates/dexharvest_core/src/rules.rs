//! Static matching rules evaluated by the extractors.
//!
//! Everything that ties extraction to the current shape of the source sites
//! lives here: header markers, column positions, heading phrases, delimiters
//! and script ranges. Traversal code reads these tables and never embeds its
//! own literals.

/// Layout of the master list tables on the primary site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogRules {
    /// Text the first header cell must contain for a table to qualify.
    pub index_marker: &'static str,
    /// Header and decoration rows at the top of every qualifying table.
    pub skipped_header_rows: usize,
    pub min_cells: usize,
    pub page_link_cell: usize,
    pub canonical_name_cell: usize,
    pub native_name_cell: usize,
    pub romanized_name_cell: usize,
    pub published_name_cell: usize,
    /// Anchor attribute carrying an explicit secondary-site link.
    pub cross_reference_attr: &'static str,
}

pub const CATALOG_RULES: CatalogRules = CatalogRules {
    index_marker: "Ndex",
    skipped_header_rows: 2,
    min_cells: 6,
    page_link_cell: 1,
    canonical_name_cell: 2,
    native_name_cell: 3,
    romanized_name_cell: 4,
    published_name_cell: 5,
    cross_reference_attr: "data-url",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginRules {
    /// Lowercase prefix a section title must start with.
    pub section_prefix: &'static str,
    /// Paragraphs kept when none carries native script.
    pub fallback_paragraphs: usize,
    pub separator: &'static str,
}

pub const ORIGIN_RULES: OriginRules = OriginRules {
    section_prefix: "name origin",
    fallback_paragraphs: 2,
    separator: "  ",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtymologyRules {
    pub heading_tags: &'static [&'static str],
    /// "Names and origin" as written on the secondary site.
    pub heading_phrase: &'static str,
    pub min_data_cells: usize,
    pub min_row_cells: usize,
    pub name_cell: usize,
    pub etymology_cell: usize,
    /// Primary delimiter first, then the bullet-like fallbacks.
    pub delimiters: &'static [char],
}

pub const ETYMOLOGY_RULES: EtymologyRules = EtymologyRules {
    heading_tags: &["h2", "h3"],
    heading_phrase: "名称と由来",
    min_data_cells: 3,
    min_row_cells: 4,
    name_cell: 2,
    etymology_cell: 3,
    delimiters: &['、', '・', '•'],
};

/// Code point ranges treated as the entities' native script.
pub const NATIVE_SCRIPT_RANGES: &[(char, char)] = &[
    ('\u{4E00}', '\u{9FAF}'), // CJK ideographs
    ('\u{3041}', '\u{3093}'), // hiragana
    ('\u{30A1}', '\u{30F6}'), // katakana
];

pub fn is_native_script(ch: char) -> bool {
    NATIVE_SCRIPT_RANGES
        .iter()
        .any(|(start, end)| (*start..=*end).contains(&ch))
}

pub fn contains_native_script(text: &str) -> bool {
    text.chars().any(is_native_script)
}

/// One elemental type and the background colour the primary site paints it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRule {
    pub name: &'static str,
    pub color: &'static str,
}

pub const TYPE_RULES: &[TypeRule] = &[
    TypeRule { name: "Normal", color: "#9FA19F" },
    TypeRule { name: "Fire", color: "#E62829" },
    TypeRule { name: "Water", color: "#2980EF" },
    TypeRule { name: "Electric", color: "#F8D030" },
    TypeRule { name: "Grass", color: "#3FA129" },
    TypeRule { name: "Ice", color: "#3DCEF3" },
    TypeRule { name: "Fighting", color: "#FF8000" },
    TypeRule { name: "Poison", color: "#9141CB" },
    TypeRule { name: "Ground", color: "#915121" },
    TypeRule { name: "Flying", color: "#81B9EF" },
    TypeRule { name: "Psychic", color: "#EF4179" },
    TypeRule { name: "Bug", color: "#91A119" },
    TypeRule { name: "Rock", color: "#AFA981" },
    TypeRule { name: "Ghost", color: "#704170" },
    TypeRule { name: "Dragon", color: "#7038F8" },
    TypeRule { name: "Dark", color: "#504843" },
    TypeRule { name: "Steel", color: "#60A1B8" },
    TypeRule { name: "Fairy", color: "#EF70EF" },
];

pub fn type_rule(name: &str) -> Option<&'static TypeRule> {
    TYPE_RULES.iter().find(|rule| rule.name == name)
}

/// Card-game layout of the primary site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcgRules {
    /// Text some header cell must contain for the overview table to qualify.
    pub table_marker: &'static str,
    /// First-cell texts that label the header rather than a type.
    pub header_labels: &'static [&'static str],
    pub min_row_cells: usize,
    /// Icon `alt` texts that identify a card type, matched case-insensitively.
    pub type_names: &'static [&'static str],
}

pub const TCG_RULES: TcgRules = TcgRules {
    table_marker: "TCG",
    header_labels: &["TCG", "Type"],
    min_row_cells: 2,
    type_names: &[
        "Grass",
        "Fire",
        "Water",
        "Electric",
        "Psychic",
        "Fighting",
        "Darkness",
        "Metal",
        "Colorless",
        "Fairy",
    ],
};

impl TcgRules {
    /// Whether an icon `alt` text names one of the card types.
    pub fn names_type(&self, alt: &str) -> bool {
        let alt = alt.to_lowercase();
        self.type_names
            .iter()
            .any(|name| alt.contains(&name.to_lowercase()))
    }
}
