use anyhow::{Context, Result, anyhow, bail};

use super::{Instruction, Opcode, Operand, SourceLocation};

/// Parses the textual listing produced by `Instruction`'s `Display` impl.
///
/// One instruction per line; `name:` lines are labels, blank lines and lines
/// starting with `#` are skipped. Quoted operands may contain spaces.
pub fn parse_listing(text: &str) -> Result<Vec<Instruction>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let inst = parse_line(trimmed).with_context(|| format!("line {}: {}", idx + 1, trimmed))?;
        out.push(inst);
    }
    Ok(out)
}

fn parse_line(line: &str) -> Result<Instruction> {
    let (tokens, comment) = tokenize(line)?;
    let location = comment.as_deref().and_then(parse_location);

    let mut inst = match tokens.as_slice() {
        [] => bail!("empty instruction"),
        [single] if single.ends_with(':') && single.len() > 1 => Instruction::label(&single[..single.len() - 1]),
        _ => parse_tokens(&tokens)?,
    };
    if let Some(loc) = location {
        inst.source_location = Some(loc);
    }
    Ok(inst)
}

fn parse_tokens(tokens: &[String]) -> Result<Instruction> {
    let (result_reg, rest) = match tokens {
        [reg, eq, rest @ ..] if eq == "=" => (Some(reg.clone()), rest),
        _ => (None, tokens),
    };
    let (opcode_tok, mut operands) = rest.split_first().ok_or_else(|| anyhow!("missing opcode"))?;
    let opcode: Opcode = opcode_tok.parse()?;

    let mut inst = Instruction::new(opcode);
    inst.result_reg = result_reg;
    if matches!(opcode, Opcode::Branch | Opcode::BranchIf | Opcode::Label) {
        let (label, head) = operands.split_last().ok_or_else(|| anyhow!("{} needs a label", opcode))?;
        inst.label = Some(label.clone());
        operands = head;
    }
    inst.operands = operands.iter().map(|t| Operand::Text(t.clone())).collect();
    Ok(inst)
}

/// Splits on whitespace, keeping quoted runs intact. Returns the tokens and the
/// text of a trailing `# ...` comment, if any.
fn tokenize(line: &str) -> Result<(Vec<String>, Option<String>)> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '#' {
            let rest = line[start + 1..].trim().to_string();
            return Ok((tokens, Some(rest)));
        }
        let mut token = String::new();
        if c == '"' || c == '\'' {
            token.push(c);
            chars.next();
            let mut closed = false;
            while let Some((_, ch)) = chars.next() {
                token.push(ch);
                if ch == '\\' {
                    if let Some((_, escaped)) = chars.next() {
                        token.push(escaped);
                    }
                    continue;
                }
                if ch == c {
                    closed = true;
                    break;
                }
            }
            if !closed {
                bail!("unterminated string literal");
            }
        } else {
            while let Some(&(_, ch)) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
        }
        tokens.push(token);
    }
    Ok((tokens, None))
}

fn parse_location(text: &str) -> Option<SourceLocation> {
    let (start, end) = text.split_whitespace().next()?.split_once('-')?;
    let (sl, sc) = start.split_once(':')?;
    let (el, ec) = end.split_once(':')?;
    Some(SourceLocation::new(sl.parse().ok()?, sc.parse().ok()?, el.parse().ok()?, ec.parse().ok()?))
}
