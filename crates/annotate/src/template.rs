use crate::{command_link, NoteAction};

/// Body written when a note is first created for `line`.
///
/// Trailing spaces on the usage bullet and the prompt line are part of the format.
#[must_use]
pub fn default_template(line: usize) -> String {
    let edit = command_link(NoteAction::Edit, line);
    let delete = command_link(NoteAction::Delete, line);
    format!(
        "#### title\n- Usage \n\n```bash\n$  \n```\n\n[✏️ Edit]({edit})\n[🗑️ Delete]({delete})\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn template_is_stable() {
        let expected = concat!(
            "#### title\n",
            "- Usage \n",
            "\n",
            "```bash\n",
            "$  \n",
            "```\n",
            "\n",
            "[✏️ Edit](command:mymy.editDocumentation?%7B%22line%22%3A3%7D)\n",
            "[🗑️ Delete](command:mymy.deleteDocumentation?%7B%22line%22%3A3%7D)\n",
        );
        assert_eq!(default_template(3), expected);
    }
}
