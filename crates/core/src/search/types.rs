use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub answer: Option<String>,
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub title: String,
    pub url: String,
    pub content: String,
}

impl SearchResult {
    /// Formats the result as prompt context, one numbered snippet per block.
    pub fn as_context(&self) -> String {
        let mut out = format!("Web search results for \"{}\":\n", self.query);
        if let Some(answer) = self.answer.as_deref().filter(|a| !a.trim().is_empty()) {
            out.push_str("Summary: ");
            out.push_str(answer.trim());
            out.push('\n');
        }
        if self.snippets.is_empty() {
            out.push_str("(no results)\n");
        }
        for (idx, snippet) in self.snippets.iter().enumerate() {
            out.push_str(&format!(
                "\n[{}] {} ({})\n{}\n",
                idx + 1,
                snippet.title.trim(),
                snippet.url.trim(),
                snippet.content.trim()
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_numbers_snippets_in_order() {
        let result = SearchResult {
            query: "Infosys revenue".to_string(),
            answer: Some("Revenue rose.".to_string()),
            snippets: vec![
                Snippet {
                    title: "Q3".to_string(),
                    url: "https://a.example".to_string(),
                    content: "Revenue up 5%.".to_string(),
                },
                Snippet {
                    title: "Q4".to_string(),
                    url: "https://b.example".to_string(),
                    content: "Margins flat.".to_string(),
                },
            ],
        };
        let ctx = result.as_context();
        assert!(ctx.starts_with("Web search results for \"Infosys revenue\":\nSummary: Revenue rose.\n"));
        let first = ctx.find("[1] Q3").unwrap();
        let second = ctx.find("[2] Q4").unwrap();
        assert!(first < second);
    }
}
