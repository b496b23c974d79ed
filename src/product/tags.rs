/// Comma-separated keyword entry.
///
/// Typed text accumulates in a buffer; committing splits it on commas and
/// appends each new, lowercased tag once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagInput {
    buffer: String,
}

impl TagInput {
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Feed one typed character. A comma commits the buffer.
    pub fn push(&mut self, c: char, tags: &mut Vec<String>) {
        if c == ',' {
            self.commit(tags);
        } else {
            self.buffer.push(c);
        }
    }

    /// Backspace edits the buffer, or drops the last tag when it is empty.
    pub fn backspace(&mut self, tags: &mut Vec<String>) {
        if self.buffer.pop().is_none() {
            tags.pop();
        }
    }

    pub fn commit(&mut self, tags: &mut Vec<String>) {
        add_tags(tags, &self.buffer);
        self.buffer.clear();
    }
}

/// Append every new tag in `raw`; returns how many were added.
pub fn add_tags(tags: &mut Vec<String>, raw: &str) -> usize {
    let before = tags.len();
    for tag in raw.split(',').map(|t| t.trim().to_lowercase()) {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags.len() - before
}

pub fn remove_tag(tags: &mut Vec<String>, tag: &str) -> bool {
    let before = tags.len();
    tags.retain(|t| t != tag);
    tags.len() != before
}
