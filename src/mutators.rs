use proc_macro2::TokenStream;
use quote::quote;
use serde::Serialize;
use syn::{BinOp, Expr, Lit};

/// Category of a mutation operator.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum OperatorCategory {
    /// Comparison changes (for example `!=` → `<=`).
    Condition,

    /// Constant nudges (`n` → `n ± 1`).
    Constant,

    /// Boolean connectives (`&&` ↔ `||`).
    BooleanConnective,

    /// Arithmetic expression changes (for example `*` → `-`).
    Arithmetic,
}

/// Identifier for a specific mutation operator.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MutationOperator {
    /// Category this operator belongs to.
    pub category: OperatorCategory,

    /// Short, stable identifier for the operator (for example `ROR_EQ_TO_NEQ`).
    pub name: &'static str,
}

/// Binary operators the swap rules recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
}

impl BinOpKind {
    fn of(op: &BinOp) -> Option<Self> {
        match op {
            BinOp::Add(_) => Some(Self::Add),
            BinOp::Sub(_) => Some(Self::Sub),
            BinOp::Mul(_) => Some(Self::Mul),
            BinOp::Div(_) => Some(Self::Div),
            BinOp::Rem(_) => Some(Self::Rem),
            BinOp::And(_) => Some(Self::And),
            BinOp::Or(_) => Some(Self::Or),
            BinOp::Eq(_) => Some(Self::Eq),
            BinOp::Ne(_) => Some(Self::Ne),
            BinOp::Lt(_) => Some(Self::Lt),
            BinOp::Le(_) => Some(Self::Le),
            _ => None,
        }
    }

    fn tokens(self) -> TokenStream {
        match self {
            Self::Add => quote!(+),
            Self::Sub => quote!(-),
            Self::Mul => quote!(*),
            Self::Div => quote!(/),
            Self::Rem => quote!(%),
            Self::And => quote!(&&),
            Self::Or => quote!(||),
            Self::Eq => quote!(==),
            Self::Ne => quote!(!=),
            Self::Lt => quote!(<),
            Self::Le => quote!(<=),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    /// UOI: rewrite a numeric literal as `lit + 1` or `lit - 1`.
    NudgeLiteral { decrement: bool },

    /// AOR/LCR/ROR: swap the operator of a binary expression.
    SwapBinOp { from: BinOpKind, to: BinOpKind },
}

/// One mutation rule: does an expression match, and what does it become.
///
/// Mutators are stateless; the same table drives discovery and the
/// per-operator counts in the report.
#[derive(Debug, Clone, Copy)]
pub struct Mutator {
    pub operator: MutationOperator,
    rule: Rule,
}

impl Mutator {
    /// Replacement node for `expr`, rendered to tokens, if this rule applies.
    pub fn replacement(&self, expr: &Expr) -> Option<TokenStream> {
        match self.rule {
            Rule::NudgeLiteral { decrement } => {
                let Expr::Lit(lit) = expr else { return None };
                if !matches!(lit.lit, Lit::Int(_) | Lit::Float(_)) {
                    return None;
                }
                Some(if decrement {
                    quote!(#lit - 1)
                } else {
                    quote!(#lit + 1)
                })
            }
            Rule::SwapBinOp { from, to } => {
                let Expr::Binary(bin) = expr else { return None };
                if BinOpKind::of(&bin.op) != Some(from) {
                    return None;
                }
                let left = &bin.left;
                let right = &bin.right;
                let op = to.tokens();
                Some(quote!(#left #op #right))
            }
        }
    }
}

fn nudge(name: &'static str, decrement: bool) -> Mutator {
    Mutator {
        operator: MutationOperator {
            category: OperatorCategory::Constant,
            name,
        },
        rule: Rule::NudgeLiteral { decrement },
    }
}

fn swap(
    name: &'static str,
    category: OperatorCategory,
    from: BinOpKind,
    to: BinOpKind,
) -> Mutator {
    Mutator {
        operator: MutationOperator { category, name },
        rule: Rule::SwapBinOp { from, to },
    }
}

/// The shipped operator table.
///
/// Operators follow Yao, Harman & Jia, "A study of equivalent and stubborn
/// mutation operators using human analysis of equivalence" (ICSE 2014),
/// favouring non-stubborn, non-equivalent mutants.
pub fn default_mutators() -> Vec<Mutator> {
    use BinOpKind::*;
    use OperatorCategory::*;

    vec![
        // Inline constants: increment or decrement.
        nudge("UOI_INC", false),
        nudge("UOI_DEC", true),
        // Arithmetic: replace the operation.
        swap("AOR_DIV_TO_MUL", Arithmetic, Div, Mul),
        swap("AOR_MUL_TO_SUB", Arithmetic, Mul, Sub),
        swap("AOR_MUL_TO_ADD", Arithmetic, Mul, Add),
        swap("AOR_ADD_TO_REM", Arithmetic, Add, Rem),
        swap("AOR_SUB_TO_DIV", Arithmetic, Sub, Div),
        // Logic: change the connective.
        swap("LCR_AND_TO_OR", BooleanConnective, And, Or),
        swap("LCR_OR_TO_AND", BooleanConnective, Or, And),
        // Comparison.
        swap("ROR_NEQ_TO_LEQ", Condition, Ne, Le),
        swap("ROR_LEQ_TO_NEQ", Condition, Le, Ne),
        swap("ROR_EQ_TO_NEQ", Condition, Eq, Ne),
        swap("ROR_LT_TO_NEQ", Condition, Lt, Ne),
    ]
}
