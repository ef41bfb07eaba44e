extern crate proc_macro;
use std::collections::HashMap;

use proc_macro::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, Error, Expr, Ident, Result, Token};

/// Statements of a `program!` block, labels already resolved to instruction indices
#[derive(Debug)]
struct ProgramStatements {
    pub instructions: Vec<(Ident, Option<Operand>)>,
    pub labels: HashMap<String, u64>,
}

#[derive(Debug)]
enum Operand {
    /// A label if one with that name exists, otherwise a plain rust variable
    Ident(Ident),
    /// Everything else: literals, `(expressions)`, paths like `i64::MAX`
    Expr(Expr),
}

fn parse_operand(input: ParseStream) -> Result<Option<Operand>> {
    if input.peek(Token![;]) {
        input.parse::<Token![;]>()?;
        return Ok(None);
    }

    let operand = if input.peek(Ident) && input.peek2(Token![;]) {
        Operand::Ident(input.parse()?)
    } else {
        Operand::Expr(input.parse()?)
    };
    input.parse::<Token![;]>()?;
    Ok(Some(operand))
}

impl Parse for ProgramStatements {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut instructions = vec![];
        let mut labels = HashMap::new();

        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(Ident) {
                let ident: Ident = input.parse()?;
                if input.peek(Token![:]) {
                    input.parse::<Token![:]>()?;
                    // a label points at the next instruction
                    let index = instructions.len() as u64;
                    if labels.insert(ident.to_string(), index).is_some() {
                        return Err(Error::new(
                            ident.span(),
                            format!("label `{}` is defined twice", ident),
                        ));
                    }
                } else {
                    instructions.push((ident, parse_operand(input)?));
                }
            } else {
                return Err(lookahead.error());
            }
        }

        Ok(ProgramStatements {
            instructions,
            labels,
        })
    }
}

fn encode_instruction(
    mnemonic: &Ident,
    operand: Option<Operand>,
    labels: &HashMap<String, u64>,
) -> proc_macro2::TokenStream {
    let constructor = Ident::new(&mnemonic.to_string().to_lowercase(), mnemonic.span());
    match operand {
        None => quote! {
            crate::bytecode::Instruction::#constructor()
        },
        Some(Operand::Ident(ident)) => match labels.get(&ident.to_string()) {
            Some(index) => quote! {
                crate::bytecode::Instruction::#constructor(#index)
            },
            None => quote! {
                crate::bytecode::Instruction::#constructor(#ident)
            },
        },
        Some(Operand::Expr(expr)) => quote! {
            crate::bytecode::Instruction::#constructor(#expr)
        },
    }
}

/// Assemble a `Program` from in-source assembly.
///
/// ```ignore
/// let program = program! {
///     push 10;
///     top:
///     push -1;
///     iadd;
///     dup 0;
///     jnz top;
///     halt;
/// }?;
/// ```
///
/// Every statement ends in `;`, `name:` defines a label for the next instruction
/// and jump targets can refer to labels defined before or after them.
/// Expands to `Program::from_instructions(..)` so the result is a `Result<Program, ProgramError>`.
#[proc_macro]
pub fn program(stream: TokenStream) -> TokenStream {
    let input = parse_macro_input!(stream as ProgramStatements);

    let labels = input.labels;
    let instructions = input
        .instructions
        .into_iter()
        .map(|(mnemonic, operand)| encode_instruction(&mnemonic, operand, &labels));

    quote! {
        crate::bytecode::Program::from_instructions([#(#instructions),*])
    }
    .into()
}
