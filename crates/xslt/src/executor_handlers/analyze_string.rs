use crate::ast::{Avt, Expr, Instruction, NodeId};
use crate::context::{Focus, REGEX_GROUPS};
use crate::error::{XsltError, codes};
use crate::executor::TemplateExecutor;
use crate::output::ResultSerializer;
use regex::{Regex, RegexBuilder};
use weft_types::{AtomicValue, XdmItem, XdmValue};

/// A piece of the analyzed string; `groups` is set for matches.
struct Segment {
    text: String,
    groups: Option<XdmValue>,
}

fn compile(pattern: &str, flags: &str) -> Result<Regex, XsltError> {
    let mut literal = false;
    let mut builder_flags = (false, false, false, false);
    for flag in flags.chars() {
        match flag {
            'i' => builder_flags.0 = true,
            'm' => builder_flags.1 = true,
            's' => builder_flags.2 = true,
            'x' => builder_flags.3 = true,
            'q' => literal = true,
            other => {
                return Err(XsltError::dynamic(
                    codes::FORX0001,
                    format!("invalid regular expression flag '{other}'"),
                ));
            }
        }
    }
    let pattern = if literal {
        regex::escape(pattern)
    } else {
        pattern.to_string()
    };
    let (case_insensitive, multi_line, dot_all, extended) = builder_flags;
    RegexBuilder::new(&pattern)
        .case_insensitive(case_insensitive)
        .multi_line(multi_line)
        .dot_matches_new_line(dot_all)
        .ignore_whitespace(extended)
        .build()
        .map_err(|e| {
            XsltError::dynamic(
                codes::FORX0002,
                format!("invalid regular expression '{pattern}': {e}"),
            )
        })
}

fn segments(regex: &Regex, input: &str) -> Vec<Segment> {
    let mut found = Vec::new();
    let mut last = 0;
    for captures in regex.captures_iter(input) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        if whole.start() > last {
            found.push(Segment {
                text: input[last..whole.start()].to_string(),
                groups: None,
            });
        }
        let groups = captures
            .iter()
            .map(|group| XdmItem::from(AtomicValue::from(group.map_or("", |m| m.as_str()))))
            .collect();
        found.push(Segment {
            text: whole.as_str().to_string(),
            groups: Some(groups),
        });
        last = whole.end();
    }
    if last < input.len() {
        found.push(Segment {
            text: input[last..].to_string(),
            groups: None,
        });
    }
    found
}

impl TemplateExecutor {
    pub(crate) fn handle_analyze_string(
        &mut self,
        id: NodeId,
        select: &Expr,
        regex: &Avt,
        flags: Option<&Avt>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        let mut matching = None;
        let mut non_matching = None;
        for &child in stylesheet.children(id) {
            match &stylesheet.node(child).kind {
                Instruction::MatchingSubstring if matching.is_none() => matching = Some(child),
                Instruction::NonMatchingSubstring if non_matching.is_none() => {
                    non_matching = Some(child)
                }
                other => {
                    return Err(XsltError::static_error(
                        codes::XTSE0010,
                        format!("{} is not allowed here in xsl:analyze-string", other.name()),
                    ));
                }
            }
        }

        let input = {
            let value = self.evaluate(id, select)?;
            self.xpath(id).string_join(&value, " ")
        };
        let pattern = self.evaluate_avt(id, regex)?;
        let flags = match flags {
            Some(avt) => self.evaluate_avt(id, avt)?,
            None => String::new(),
        };
        let regex = compile(&pattern, &flags)?;
        if regex.is_match("") {
            return Err(XsltError::dynamic(
                codes::XTDE1150,
                format!("regular expression '{pattern}' matches a zero-length string"),
            ));
        }

        let pieces = segments(&regex, &input);
        let saved = self.ctx.scratch.remove(REGEX_GROUPS);
        let count = pieces.len();
        let mut result = Ok(());
        for (i, piece) in pieces.into_iter().enumerate() {
            let branch = match &piece.groups {
                Some(_) => matching,
                None => non_matching,
            };
            let Some(branch) = branch else {
                continue;
            };
            match piece.groups {
                Some(groups) => self.ctx.scratch.insert(REGEX_GROUPS.to_string(), groups),
                None => self.ctx.scratch.remove(REGEX_GROUPS),
            };
            let focus = Focus::new(XdmItem::from(AtomicValue::from(piece.text)), i + 1, count);
            result = self.with_focus(focus, |this| this.run_branch(branch, out));
            if result.is_err() {
                break;
            }
        }
        match saved {
            Some(groups) => self.ctx.scratch.insert(REGEX_GROUPS.to_string(), groups),
            None => self.ctx.scratch.remove(REGEX_GROUPS),
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_alternate_between_matches_and_gaps() {
        let regex = compile("[0-9]+", "").unwrap();
        let pieces = segments(&regex, "ab12cd345");
        let texts: Vec<_> = pieces.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, ["ab", "12", "cd", "345"]);
        assert!(pieces[1].groups.is_some());
        assert!(pieces[2].groups.is_none());
    }

    #[test]
    fn capture_groups_include_the_whole_match() {
        let regex = compile("(a)(x)?", "").unwrap();
        let pieces = segments(&regex, "a");
        let groups = pieces[0].groups.as_ref().unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.items()[2], XdmItem::from(AtomicValue::from("")));
    }

    #[test]
    fn flags_are_validated() {
        assert!(compile("A", "i").unwrap().is_match("a"));
        assert!(compile("a.b", "q").unwrap().is_match("a.b"));
        assert!(!compile("a.b", "q").unwrap().is_match("axb"));
        let err = compile("a", "z").unwrap_err();
        assert!(err.has_code(codes::FORX0001));
        let err = compile("(", "").unwrap_err();
        assert!(err.has_code(codes::FORX0002));
    }
}
