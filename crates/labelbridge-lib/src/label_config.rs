//! Label Studio UI configuration built as an element tree.
//!
//! A root `View` owns its children outright; [`Element::render`] walks the
//! tree once and produces indented markup. Attribute values and text are
//! escaped on output, so labels and headers may contain any characters.

use serde::{Deserialize, Serialize};

use crate::model::turn::{Turn, TurnField};

const INDENT: &str = "  ";

/// Online Asymptote compiler linked from every assistant panel by default.
pub const DEFAULT_PLAYGROUND_URL: &str = "https://asymptote.ualberta.ca/";

/// Stylesheet placed at the top of the root view.
const STYLESHEET: &str = "\
.root {
  font-family: 'Roboto', sans-serif;
  background-color: #F9F9F9;
  line-height: 1.6;
}
.container {
  margin: 0 auto;
  padding: 20px;
  background-color: #fff;
  border-radius: 6px;
  box-shadow: 0 2px 10px rgba(0, 0, 0, 0.1);
}
.turn {
  margin-bottom: 25px;
  padding: 15px;
  border: 1px solid #ddd;
  border-radius: 5px;
}
.user {
  background-color: #543ED4;
  color: #fff;
  padding: 10px;
  margin-bottom: 10px;
  border-radius: 5px;
}
.image {
  background-color: #FCE9CE;
  color: #000;
  padding: 10px;
  border-left: 4px solid #FF9F0D;
  margin-bottom: 10px;
  border-radius: 5px;
  font-family: monospace;
}
.image:hover {
  background-color: #F7DFB9;
  cursor: pointer;
  transition: 0.3s;
}
.assistant {
  background-color: #B96902;
  color: #fff;
  padding: 10px;
  border-radius: 5px;
  margin-bottom: 10px;
}
.assistant:hover {
  background-color: #C2740E;
  cursor: pointer;
  transition: 0.3s;
}
.tool {
  background-color: #E8F0FE;
  color: #000;
  padding: 10px;
  border-left: 4px solid #1A73E8;
  margin-bottom: 10px;
  border-radius: 5px;
  font-family: monospace;
}";

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// A markup element with ordered attributes and owned children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Shorthand for `<View className="...">`.
    pub fn view(class_name: &str) -> Self {
        Element::new("View").attr("className", class_name)
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.attrs.push((name.into(), value.to_string()));
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// This element and every descendant element, collected depth-first.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = vec![self];
        for child in &self.children {
            if let Node::Element(el) = child {
                out.extend(el.descendants());
            }
        }
        out
    }

    /// Serialize the tree to markup.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let pad = INDENT.repeat(depth);
        out.push_str(&pad);
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape(value, true));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>\n");
            return;
        }
        out.push_str(">\n");
        for child in &self.children {
            match child {
                Node::Element(el) => el.render_into(out, depth + 1),
                Node::Text(text) => {
                    let inner = INDENT.repeat(depth + 1);
                    for line in text.lines() {
                        if !line.is_empty() {
                            out.push_str(&inner);
                            out.push_str(&escape(line, false));
                        }
                        out.push('\n');
                    }
                }
            }
        }
        out.push_str(&pad);
        out.push_str("</");
        out.push_str(&self.tag);
        out.push_str(">\n");
    }
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\n' if attribute => out.push_str("&#10;"),
            _ => out.push(c),
        }
    }
    out
}

/// Options for the generated labeling interface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfigOptions {
    /// Show each turn's `image_url` next to the prompt.
    pub include_image: bool,
    pub user_header: String,
    pub image_header: String,
    pub assistant_header: String,
    /// Link shown under the assistant response. `None` or empty omits it.
    pub playground_url: Option<String>,
    pub user_rows: u32,
    pub assistant_rows: u32,
}

impl Default for LabelConfigOptions {
    fn default() -> Self {
        LabelConfigOptions {
            include_image: true,
            user_header: "Math Question:".to_string(),
            image_header: "Generated Image".to_string(),
            assistant_header: "Asymptote Code:".to_string(),
            playground_url: Some(DEFAULT_PLAYGROUND_URL.to_string()),
            user_rows: 4,
            assistant_rows: 6,
        }
    }
}

fn text_area(name: String, to_name: &str, value: String, rows: u32) -> Element {
    Element::new("TextArea")
        .attr("name", name)
        .attr("toName", to_name)
        .attr("value", value)
        .attr("required", "true")
        .attr("rows", rows)
        .attr("markdown", "true")
}

/// Optional editable fields, each with its control prefix and header.
const EXTRA_FIELDS: [(TurnField, &str, &str); 4] = [
    (TurnField::Reasoning, "assistant_reasoning", "Reasoning:"),
    (TurnField::ToolName, "tool_name", "Tool Name:"),
    (TurnField::Tool, "tool", "Tool Call:"),
    (TurnField::AssistantTool, "assistant_tool", "Assistant Tool Output:"),
];

fn turn_view(i: usize, turn: &Turn, options: &LabelConfigOptions) -> Element {
    // TextAreas need an object tag to point at; without the image we anchor
    // them to a plain Text carrying the turn label.
    let anchor = if options.include_image {
        format!("image_{i}")
    } else {
        format!("turn_{i}")
    };

    let mut view = Element::view("turn").child(
        Element::new("Header")
            .attr("value", format!("Turn {i}"))
            .attr("size", 4),
    );
    if !options.include_image {
        view.push(
            Element::new("Text")
                .attr("name", &anchor)
                .attr("value", format!("Turn {i}")),
        );
    }

    view.push(
        Element::view("user")
            .child(Element::new("Header").attr("value", &options.user_header))
            .child(text_area(
                format!("user_{i}"),
                &anchor,
                format!("$turns.{i}.user"),
                options.user_rows,
            )),
    );

    if options.include_image {
        view.push(
            Element::view("image")
                .child(Element::new("Header").attr("value", &options.image_header))
                .child(
                    Element::new("Text")
                        .attr("name", &anchor)
                        .attr("value", format!("$turns.{i}.image_url")),
                ),
        );
    }

    let mut assistant = Element::view("assistant")
        .child(Element::new("Header").attr("value", &options.assistant_header))
        .child(text_area(
            format!("assistant_{i}"),
            &anchor,
            format!("$turns.{i}.chat_text"),
            options.assistant_rows,
        ));
    if let Some(url) = options.playground_url.as_deref().filter(|u| !u.is_empty()) {
        assistant.push(
            Element::new("Text")
                .attr("name", format!("asymptote_playground_{i}"))
                .attr("value", format!("Asymptote Playground: {url}")),
        );
    }
    view.push(assistant);

    for (field, prefix, header) in EXTRA_FIELDS {
        if !turn.has(field) {
            continue;
        }
        view.push(
            Element::view("tool")
                .child(Element::new("Header").attr("value", header))
                .child(text_area(
                    format!("{prefix}_{i}"),
                    &anchor,
                    format!("$turns.{i}.{}", field.as_str()),
                    options.assistant_rows,
                )),
        );
    }

    view
}

/// Build the labeling interface for `turns`: one collapsible panel per turn.
pub fn build_label_config(turns: &[Turn], options: &LabelConfigOptions) -> Element {
    let mut collapse = Element::new("Collapse");
    for (i, turn) in turns.iter().enumerate() {
        collapse.push(
            Element::new("Panel")
                .attr("value", format!("Turn {i}"))
                .child(turn_view(i, turn, options)),
        );
    }

    let mut container = Element::view("container");
    if !turns.is_empty() {
        container.push(Element::view("turn").child(collapse));
    }

    Element::view("root")
        .child(Element::new("Style").text(STYLESHEET))
        .child(container)
}

/// Build and render the labeling interface.
pub fn render_label_config(turns: &[Turn], options: &LabelConfigOptions) -> String {
    build_label_config(turns, options).render()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(n: usize) -> Vec<Turn> {
        (0..n)
            .map(|i| Turn {
                user: Some(format!("q{i}")),
                ..Default::default()
            })
            .collect()
    }

    fn names(root: &Element) -> Vec<String> {
        root.descendants()
            .into_iter()
            .filter_map(|el| el.get_attr("name").map(str::to_string))
            .collect()
    }

    #[test]
    fn one_panel_per_turn_with_named_controls() {
        let root = build_label_config(&turns(2), &LabelConfigOptions::default());
        let panels: Vec<_> = root
            .descendants()
            .into_iter()
            .filter(|el| el.tag() == "Panel")
            .collect();
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[1].get_attr("value"), Some("Turn 1"));
        assert_eq!(
            names(&root),
            vec![
                "user_0",
                "image_0",
                "assistant_0",
                "asymptote_playground_0",
                "user_1",
                "image_1",
                "assistant_1",
                "asymptote_playground_1"
            ]
        );
    }

    #[test]
    fn text_areas_point_at_the_turn_image() {
        let root = build_label_config(&turns(1), &LabelConfigOptions::default());
        let area = root
            .descendants()
            .into_iter()
            .find(|el| el.get_attr("name") == Some("assistant_0"))
            .unwrap();
        assert_eq!(area.get_attr("toName"), Some("image_0"));
        assert_eq!(area.get_attr("value"), Some("$turns.0.chat_text"));
        assert_eq!(area.get_attr("rows"), Some("6"));
    }

    #[test]
    fn without_image_controls_anchor_to_turn_text() {
        let options = LabelConfigOptions {
            include_image: false,
            ..Default::default()
        };
        let root = build_label_config(&turns(1), &options);
        assert_eq!(
            names(&root),
            vec!["turn_0", "user_0", "assistant_0", "asymptote_playground_0"]
        );
        let area = root
            .descendants()
            .into_iter()
            .find(|el| el.get_attr("name") == Some("user_0"))
            .unwrap();
        assert_eq!(area.get_attr("toName"), Some("turn_0"));
    }

    #[test]
    fn default_headers_and_playground_link() {
        let markup = render_label_config(&turns(1), &LabelConfigOptions::default());
        assert!(markup.contains("<Header value=\"Turn 0\" size=\"4\"/>"));
        assert!(markup.contains("<Header value=\"Math Question:\"/>"));
        assert!(markup.contains("<Header value=\"Generated Image\"/>"));
        assert!(markup.contains("<Header value=\"Asymptote Code:\"/>"));
        assert!(markup.contains(
            "<Text name=\"asymptote_playground_0\" value=\"Asymptote Playground: https://asymptote.ualberta.ca/\"/>"
        ));
    }

    #[test]
    fn optional_fields_are_emitted_on_demand() {
        let mut flat = turns(2);
        flat[1].reasoning = Some("why".to_string());
        flat[1].tool_name = Some("calc".to_string());
        let root = build_label_config(&flat, &LabelConfigOptions::default());
        let all = names(&root);
        assert!(all.contains(&"assistant_reasoning_1".to_string()));
        assert!(all.contains(&"tool_name_1".to_string()));
        assert!(!all.contains(&"assistant_reasoning_0".to_string()));
    }

    #[test]
    fn empty_or_missing_playground_url_omits_the_link() {
        for playground_url in [None, Some(String::new())] {
            let options = LabelConfigOptions {
                playground_url,
                ..Default::default()
            };
            let root = build_label_config(&turns(1), &options);
            assert!(!names(&root).contains(&"asymptote_playground_0".to_string()));
        }
    }

    #[test]
    fn render_escapes_and_self_closes() {
        let el = Element::new("View")
            .attr("className", "a\"b")
            .child(Element::new("Header").attr("value", "x < y & z"));
        assert_eq!(
            el.render(),
            "<View className=\"a&quot;b\">\n  <Header value=\"x &lt; y &amp; z\"/>\n</View>\n"
        );
    }

    #[test]
    fn rendered_config_is_balanced() {
        let markup = render_label_config(&turns(3), &LabelConfigOptions::default());
        assert!(markup.starts_with("<View className=\"root\">"));
        assert!(markup.contains("<Style>\n    .root {"));
        assert_eq!(
            markup.matches("<Panel ").count(),
            markup.matches("</Panel>").count()
        );
        assert!(markup.contains("value=\"$turns.2.user\""));
    }

    #[test]
    fn empty_turn_list_renders_empty_container() {
        let markup = render_label_config(&[], &LabelConfigOptions::default());
        assert!(markup.contains("<View className=\"container\"/>"));
        assert!(!markup.contains("Collapse"));
    }
}
