// src/generator/xml.rs

//! Small XML writer for installer descriptors

use crate::error::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::path::Path;

/// Indented XML document built element by element
pub struct XmlDocument {
    writer: Writer<Vec<u8>>,
}

impl XmlDocument {
    /// Start a document with an XML declaration
    pub fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(Self { writer })
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer.write_event(Event::Start(element))?;
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// Self-closing element
    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer.write_event(Event::Empty(element))?;
        Ok(())
    }

    /// Element holding escaped text only
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.text_element_with(name, &[], text)
    }

    pub fn text_element_with(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<()> {
        self.start(name, attributes)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    pub fn comment(&mut self, text: &str) -> Result<()> {
        self.writer
            .write_event(Event::Comment(BytesText::new(text)))?;
        Ok(())
    }

    pub fn into_string(self) -> String {
        let mut content = String::from_utf8_lossy(&self.writer.into_inner()).into_owned();
        content.push('\n');
        content
    }

    /// Write the document to a file, replacing any existing one
    pub fn write_to(self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.into_string())?;
        Ok(())
    }
}
