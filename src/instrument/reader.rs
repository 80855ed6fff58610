// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Reader for SFZ instrument text.

use pest::Parser;
use pest_derive::Parser;

use crate::opcode::Opcode;

#[derive(Parser)]
#[grammar = "src/instrument/sfz.pest"]
struct SfzParser;

/// The header that opens a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Control,
    Global,
    Master,
    Group,
    Region,
    /// A header this reader does not support, such as `<curve>` or `<effect>`.
    Unsupported(String),
    /// Opcodes that appear before the first header.
    None,
}

impl Header {
    fn from_name(name: &str) -> Header {
        match name.to_ascii_lowercase().as_str() {
            "control" => Header::Control,
            "global" => Header::Global,
            "master" => Header::Master,
            "group" => Header::Group,
            "region" => Header::Region,
            _ => Header::Unsupported(name.to_string()),
        }
    }
}

/// A header and the opcodes that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub header: Header,
    pub opcodes: Vec<Opcode>,
}

/// The parsed contents of an instrument file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Document {
    pub sections: Vec<Section>,
    /// Preprocessor directives such as `#define`, which are not supported.
    pub directives: Vec<String>,
}

/// A syntax error with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

/// Parses instrument text into sections.
pub fn parse_document(content: &str) -> Result<Document, SyntaxError> {
    let pairs = match SfzParser::parse(Rule::file, content) {
        Ok(pairs) => pairs,
        Err(e) => {
            let (line, col) = match e.line_col {
                pest::error::LineColLocation::Pos((line, col)) => (line, col),
                pest::error::LineColLocation::Span((line, col), _) => (line, col),
            };
            return Err(SyntaxError {
                line,
                col,
                message: e.variant.message().to_string(),
            });
        }
    };

    let mut document = Document::default();
    let mut current: Option<Section> = None;

    for pair in pairs.flatten() {
        match pair.as_rule() {
            Rule::header_name => {
                if let Some(section) = current.take() {
                    document.sections.push(section);
                }
                current = Some(Section {
                    header: Header::from_name(pair.as_str()),
                    opcodes: Vec::new(),
                });
            }
            Rule::directive_name => document.directives.push(format!("#{}", pair.as_str())),
            Rule::opcode => {
                let mut inner = pair.into_inner();
                let key = inner.next().map(|p| p.as_str()).unwrap_or_default();
                let value = inner.next().map(|p| p.as_str()).unwrap_or_default();
                current
                    .get_or_insert_with(|| Section {
                        header: Header::None,
                        opcodes: Vec::new(),
                    })
                    .opcodes
                    .push(Opcode::new(key, value.trim()));
            }
            _ => {}
        }
    }

    if let Some(section) = current.take() {
        document.sections.push(section);
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections() {
        let content = r#"
            <control> default_path=samples/
            <global> volume=-3
            <group> lokey=60 hikey=72
            <region> sample=Piano C4.wav pitch_keycenter=60
            <region>
            sample=piano d4.wav
            pitch_keycenter=62
        "#;

        let document = parse_document(content).unwrap();
        let headers: Vec<&Header> = document.sections.iter().map(|s| &s.header).collect();
        assert_eq!(
            headers,
            vec![
                &Header::Control,
                &Header::Global,
                &Header::Group,
                &Header::Region,
                &Header::Region
            ]
        );

        let region = &document.sections[3];
        assert_eq!(region.opcodes[0], Opcode::new("sample", "Piano C4.wav"));
        assert_eq!(region.opcodes[1], Opcode::new("pitch_keycenter", "60"));

        let region = &document.sections[4];
        assert_eq!(region.opcodes[0].value, "piano d4.wav");
        assert_eq!(region.opcodes[1].value, "62");
    }

    #[test]
    fn test_comments() {
        let content = "// leading comment\n\
                       <region> sample=a.wav // trailing comment\n\
                       /* block\n comment */ lokey=c4\n";
        let document = parse_document(content).unwrap();
        assert_eq!(document.sections.len(), 1);
        assert_eq!(
            document.sections[0].opcodes,
            vec![Opcode::new("sample", "a.wav"), Opcode::new("lokey", "c4")]
        );
    }

    #[test]
    fn test_parameterized_keys() {
        let document = parse_document("<region> locc64=64 hicc64=127").unwrap();
        let opcodes = &document.sections[0].opcodes;
        assert_eq!(opcodes[0].name, "locc");
        assert_eq!(opcodes[0].parameter, Some(64));
        assert_eq!(opcodes[1].name, "hicc");
    }

    #[test]
    fn test_unsupported_headers_and_directives() {
        let content = "#define $KEY 60\n<curve> v000=0\n<region> sample=a.wav\n";
        let document = parse_document(content).unwrap();
        assert_eq!(document.directives, vec!["#define".to_string()]);
        assert_eq!(
            document.sections[0].header,
            Header::Unsupported("curve".to_string())
        );
        assert_eq!(document.sections[1].header, Header::Region);
    }

    #[test]
    fn test_opcodes_before_header() {
        let document = parse_document("volume=3\n<region> sample=a.wav").unwrap();
        assert_eq!(document.sections[0].header, Header::None);
        assert_eq!(document.sections[0].opcodes.len(), 1);
    }

    #[test]
    fn test_windows_line_endings() {
        let document = parse_document("<region>\r\nsample=a.wav\r\nkey=60\r\n").unwrap();
        assert_eq!(
            document.sections[0].opcodes,
            vec![Opcode::new("sample", "a.wav"), Opcode::new("key", "60")]
        );
    }

    #[test]
    fn test_syntax_error_position() {
        let error = parse_document("<region>\nsample=a.wav\n<region\n").unwrap_err();
        assert_eq!(error.line, 3);
        assert!(!error.message.is_empty());
    }
}
