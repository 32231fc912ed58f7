//! Turns a sequence of parsed statements into an object module.
//!
//! Tokenising and parsing the source text happens before this point;
//! here we only encode instructions and lay out labels.
use std::collections::BTreeMap;

use tracing::{event, Level};

use base::prelude::{encode, EncodingError, Opcode, Tag, Token};

use super::code::{CodeError, CodeNode};
use super::object::ObjectModule;
use super::symbol::SymbolName;
use super::types::{AssemblyError, ModuleName};

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Statement {
    /// Defines a label at the current position.
    Label(Token),
    Instruction {
        mnemonic: Token,
        operand: Option<Token>,
    },
}

impl Statement {
    pub fn label(name: &str) -> Statement {
        Statement::Label(Token::new(Tag::Ident, name))
    }

    pub fn instruction(mnemonic: Token, operand: Option<Token>) -> Statement {
        Statement::Instruction { mnemonic, operand }
    }
}

fn assemble_instruction(mnemonic: &Token, operand: Option<&Token>) -> Result<CodeNode, EncodingError> {
    match (mnemonic.tag(), operand) {
        (Tag::Call, Some(target)) if target.tag() == Tag::Ident => {
            // The target offset is not known until link time.
            Ok(CodeNode::seq(
                CodeNode::bytes([Opcode::Call.number()]),
                CodeNode::reference(SymbolName::from(target)),
            ))
        }
        _ => encode(mnemonic, operand).map(|instruction| CodeNode::bytes(instruction.to_bytes())),
    }
}

/// Assemble `statements` into a module called `name`.
///
/// # Errors
///
/// Every statement which cannot be encoded, every label defined more
/// than once, and every label too far from the start of the module
/// to be addressed is reported.  Errors are identified by the index
/// of the statement in `statements`.
pub fn assemble(name: ModuleName, statements: &[Statement]) -> Result<ObjectModule, Vec<AssemblyError>> {
    let mut errors: Vec<AssemblyError> = Vec::new();
    let mut nodes: Vec<CodeNode> = Vec::with_capacity(statements.len());
    let mut labels: BTreeMap<SymbolName, usize> = BTreeMap::new();
    let mut offset: usize = 0;

    for (index, statement) in statements.iter().enumerate() {
        match statement {
            Statement::Label(token) => {
                let label = SymbolName::from(token);
                if labels.contains_key(&label) {
                    errors.push(AssemblyError::DuplicateLabel {
                        statement: index,
                        name: label,
                    });
                    continue;
                }
                if i16::try_from(offset).is_err() {
                    errors.push(AssemblyError::LabelOutOfRange {
                        statement: index,
                        name: label,
                    });
                    continue;
                }
                labels.insert(label.clone(), index);
                nodes.push(CodeNode::label(label));
            }
            Statement::Instruction { mnemonic, operand } => {
                match assemble_instruction(mnemonic, operand.as_ref()) {
                    Ok(node) => {
                        offset += node.size();
                        nodes.push(node);
                    }
                    Err(error) => {
                        errors.push(AssemblyError::Encoding {
                            statement: index,
                            error,
                        });
                    }
                }
            }
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let code = CodeNode::sequence(nodes);
    event!(
        Level::DEBUG,
        "assembled {} statements of {name} into {} bytes with {} labels",
        statements.len(),
        code.size(),
        labels.len()
    );
    // Labels were range-checked above, so this should not fail.
    ObjectModule::new(name, code).map_err(|e| {
        let name = match e {
            CodeError::OffsetOutOfRange { name, .. } | CodeError::UnresolvedSymbol(name) => name,
        };
        let statement = labels.get(&name).copied().unwrap_or(statements.len());
        vec![AssemblyError::LabelOutOfRange { statement, name }]
    })
}
