//! Source-to-bytecode compiler
//!
//! A single recursive-descent pass over the token stream. Each structured
//! block (`if`/`then`, `do`/`loop`, `begin` loops, `: ... ;` definitions)
//! is compiled into a fresh segment and referenced from its enclosing
//! segment, so the interpreter never needs a general jump. Side tables of
//! variables, inputs, outputs, and user-defined words grow as declarations
//! are encountered.

use crate::bytecode::{Bytecode, DictionaryEntry, Opcode, OutputDecl, ReadSpec, DICTIONARY_BASE};
use crate::dtype::Dtype;
use crate::error::CompileError;
use crate::token::{tokenize, Token};

/// Words with fixed syntactic meaning; none may be used as a name.
const RESERVED_WORDS: &[&str] = &[
    // comments
    "(", ")", "\\", "\n",
    // defining words
    ":", ";", "recurse",
    // declaring globals
    "variable", "input", "output",
    // external control flow
    "halt", "pause",
    // conditionals
    "if", "then", "else",
    // loops
    "do", "loop", "+loop", "begin", "again", "until", "while", "repeat",
    // nonlocal exits
    "exit",
    // variable access
    "!", "+!", "@",
    // input actions
    "len", "pos", "end", "seek", "skip",
    // output actions
    "<-", "stack", "rewind",
];

/// Compile source text into a program image.
pub fn compile(source: &str) -> Result<Bytecode, CompileError> {
    Compiler::new(source).run()
}

struct Compiler<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    segments: Vec<Vec<i32>>,
    variables: Vec<String>,
    inputs: Vec<String>,
    outputs: Vec<OutputDecl>,
    dictionary: Vec<DictionaryEntry>,
}

impl<'a> Compiler<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: tokenize(source),
            segments: Vec::new(),
            variables: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            dictionary: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Bytecode, CompileError> {
        self.segments.push(Vec::new());
        let stop = self.tokens.len();
        self.parse_range(None, 0, stop, 0, 0, 0)?;

        let mut code = Vec::new();
        let mut offsets = vec![0];
        for segment in &self.segments {
            code.extend_from_slice(segment);
            offsets.push(code.len());
        }
        Ok(Bytecode {
            code,
            offsets,
            variables: self.variables,
            inputs: self.inputs,
            outputs: self.outputs,
            dictionary: self.dictionary,
        })
    }

    /// Compile `tokens[start..stop]` into `segment`.
    ///
    /// `definition` is the name of the enclosing `: ... ;` word, if any;
    /// `exit_depth` counts block segments between here and that word's
    /// body; `do_depth` counts enclosing counted loops.
    fn parse_range(
        &mut self,
        definition: Option<&'a str>,
        start: usize,
        stop: usize,
        segment: usize,
        exit_depth: i32,
        do_depth: usize,
    ) -> Result<(), CompileError> {
        let mut pos = start;
        while pos < stop {
            let word = self.tokens[pos].text;

            if word == "(" {
                // Parenthesized comment; inner parentheses must balance.
                let mut substop = pos;
                let mut nesting = 1;
                while nesting > 0 {
                    substop += 1;
                    if substop >= stop {
                        return Err(self.error_at(pos, substop, "'(' is missing its closing ')'"));
                    }
                    match self.tokens[substop].text {
                        "(" => nesting += 1,
                        ")" => nesting -= 1,
                        _ => {}
                    }
                }
                pos = substop + 1;
            } else if word == "\\" {
                // Comment to end of line.
                let mut substop = pos;
                while substop < stop && self.tokens[substop].text != "\n" {
                    substop += 1;
                }
                pos = substop + 1;
            } else if word == "\n" {
                // Only meaningful as a line-comment terminator.
                pos += 1;
            } else if word == ":" {
                if pos + 1 >= stop || self.tokens[pos + 1].text == ";" {
                    return Err(self.error_at(pos, pos + 2, "missing name in word definition"));
                }
                let name = self.tokens[pos + 1].text;
                self.check_new_name(pos, name)?;

                let substart = pos + 2;
                let mut substop = pos + 1;
                let mut nesting = 1;
                while nesting > 0 {
                    substop += 1;
                    if substop >= stop {
                        return Err(self.error_at(
                            pos,
                            stop,
                            "definition is missing its closing ';'",
                        ));
                    }
                    match self.tokens[substop].text {
                        ":" => nesting += 1,
                        ";" => nesting -= 1,
                        _ => {}
                    }
                }

                // Enter the word into the dictionary before compiling its
                // body so that it can call itself.
                let body = self.add_segment();
                self.dictionary.push(DictionaryEntry {
                    name: name.to_string(),
                    reference: DICTIONARY_BASE + body as i32,
                });
                self.parse_range(Some(name), substart, substop, body, 0, 0)?;
                pos = substop + 1;
            } else if word == "recurse" {
                let Some(name) = definition else {
                    return Err(self.error_at(
                        pos,
                        pos + 1,
                        "only allowed in a ': name ... ;' definition",
                    ));
                };
                if let Some(index) = self.dictionary.iter().position(|e| e.name == name) {
                    let reference = self.dictionary[index].reference;
                    self.emit(segment, reference);
                }
                pos += 1;
            } else if word == "variable" {
                if pos + 1 >= stop {
                    return Err(self.error_at(pos, pos + 2, "missing name in variable declaration"));
                }
                let name = self.tokens[pos + 1].text;
                self.check_new_name(pos, name)?;
                self.variables.push(name.to_string());
                pos += 2;
            } else if word == "input" {
                if pos + 1 >= stop {
                    return Err(self.error_at(pos, pos + 2, "missing name in input declaration"));
                }
                let name = self.tokens[pos + 1].text;
                self.check_new_name(pos, name)?;
                self.inputs.push(name.to_string());
                pos += 2;
            } else if word == "output" {
                if pos + 2 >= stop {
                    return Err(self.error_at(
                        pos,
                        pos + 3,
                        "missing name or dtype in output declaration",
                    ));
                }
                let name = self.tokens[pos + 1].text;
                self.check_new_name(pos, name)?;
                let Some(dtype) = Dtype::from_keyword(self.tokens[pos + 2].text) else {
                    return Err(self.error_at(pos, pos + 3, "output dtype not recognized"));
                };
                self.outputs.push(OutputDecl {
                    name: name.to_string(),
                    dtype,
                });
                pos += 3;
            } else if word == "halt" {
                self.emit(segment, Opcode::Halt as i32);
                pos += 1;
            } else if word == "pause" {
                self.emit(segment, Opcode::Pause as i32);
                pos += 1;
            } else if word == "if" {
                let substart = pos + 1;
                let mut subelse = None;
                let mut substop = pos;
                let mut nesting = 1;
                while nesting > 0 {
                    substop += 1;
                    if substop >= stop {
                        return Err(self.error_at(pos, stop, "'if' is missing its closing 'then'"));
                    }
                    match self.tokens[substop].text {
                        "if" => nesting += 1,
                        "then" => nesting -= 1,
                        "else" if nesting == 1 => subelse = Some(substop),
                        _ => {}
                    }
                }

                match subelse {
                    None => {
                        let consequent = self.add_segment();
                        self.parse_range(
                            definition,
                            substart,
                            substop,
                            consequent,
                            exit_depth + 1,
                            do_depth,
                        )?;
                        self.emit(segment, Opcode::If as i32);
                        self.emit(segment, DICTIONARY_BASE + consequent as i32);
                    }
                    Some(subelse) => {
                        let consequent = self.add_segment();
                        self.parse_range(
                            definition,
                            substart,
                            subelse,
                            consequent,
                            exit_depth + 1,
                            do_depth,
                        )?;
                        let alternate = self.add_segment();
                        self.parse_range(
                            definition,
                            subelse + 1,
                            substop,
                            alternate,
                            exit_depth + 1,
                            do_depth,
                        )?;
                        self.emit(segment, Opcode::IfElse as i32);
                        self.emit(segment, DICTIONARY_BASE + consequent as i32);
                        self.emit(segment, DICTIONARY_BASE + alternate as i32);
                    }
                }
                pos = substop + 1;
            } else if word == "do" {
                let substart = pos + 1;
                let mut substop = pos;
                let mut is_step = false;
                let mut nesting = 1;
                while nesting > 0 {
                    substop += 1;
                    if substop >= stop {
                        return Err(self.error_at(pos, stop, "'do' is missing its closing 'loop'"));
                    }
                    match self.tokens[substop].text {
                        "do" => nesting += 1,
                        "loop" => nesting -= 1,
                        "+loop" => {
                            if nesting == 1 {
                                is_step = true;
                            }
                            nesting -= 1;
                        }
                        _ => {}
                    }
                }

                let body = self.add_segment();
                self.parse_range(
                    definition,
                    substart,
                    substop,
                    body,
                    exit_depth + 1,
                    do_depth + 1,
                )?;
                let opcode = if is_step { Opcode::DoStep } else { Opcode::Do };
                self.emit(segment, opcode as i32);
                self.emit(segment, DICTIONARY_BASE + body as i32);
                pos = substop + 1;
            } else if word == "begin" {
                let substart = pos + 1;
                let mut substop = pos;
                let mut is_again = false;
                let mut subwhile = None;
                let mut nesting = 1;
                while nesting > 0 {
                    substop += 1;
                    if substop >= stop {
                        return Err(self.error_at(
                            pos,
                            stop,
                            "'begin' is missing its closing 'again', 'until', or 'while ... repeat'",
                        ));
                    }
                    match self.tokens[substop].text {
                        "begin" => nesting += 1,
                        "until" => nesting -= 1,
                        "again" => {
                            if nesting == 1 {
                                is_again = true;
                            }
                            nesting -= 1;
                        }
                        "while" => {
                            if nesting == 1 {
                                subwhile = Some(substop);
                            }
                            nesting -= 1;
                            let mut subnesting = 1;
                            while subnesting > 0 {
                                substop += 1;
                                if substop >= stop {
                                    return Err(self.error_at(
                                        pos,
                                        stop,
                                        "'while' is missing its closing 'repeat'",
                                    ));
                                }
                                match self.tokens[substop].text {
                                    "while" => subnesting += 1,
                                    "repeat" => subnesting -= 1,
                                    _ => {}
                                }
                            }
                        }
                        _ => {}
                    }
                }

                if is_again {
                    let body = self.add_segment();
                    self.parse_range(
                        definition,
                        substart,
                        substop,
                        body,
                        exit_depth + 1,
                        do_depth,
                    )?;
                    self.emit(segment, DICTIONARY_BASE + body as i32);
                    self.emit(segment, Opcode::Again as i32);
                } else if let Some(subwhile) = subwhile {
                    let precondition = self.add_segment();
                    self.parse_range(
                        definition,
                        substart,
                        subwhile,
                        precondition,
                        exit_depth + 1,
                        do_depth,
                    )?;
                    let postcondition = self.add_segment();
                    self.parse_range(
                        definition,
                        subwhile + 1,
                        substop,
                        postcondition,
                        exit_depth + 1,
                        do_depth,
                    )?;
                    self.emit(segment, DICTIONARY_BASE + precondition as i32);
                    self.emit(segment, Opcode::While as i32);
                    self.emit(segment, DICTIONARY_BASE + postcondition as i32);
                } else {
                    let body = self.add_segment();
                    self.parse_range(
                        definition,
                        substart,
                        substop,
                        body,
                        exit_depth + 1,
                        do_depth,
                    )?;
                    self.emit(segment, DICTIONARY_BASE + body as i32);
                    self.emit(segment, Opcode::Until as i32);
                }
                pos = substop + 1;
            } else if word == "exit" {
                self.emit(segment, Opcode::Exit as i32);
                self.emit(segment, exit_depth);
                pos += 1;
            } else if let Some(index) = self.variables.iter().position(|n| n == word) {
                let follower = if pos + 1 < stop {
                    self.tokens[pos + 1].text
                } else {
                    ""
                };
                let opcode = match follower {
                    "!" => Opcode::Put,
                    "+!" => Opcode::Inc,
                    "@" => Opcode::Get,
                    _ => {
                        return Err(self.error_at(
                            pos,
                            pos + 2,
                            "missing '!', '+!', or '@' after variable name",
                        ));
                    }
                };
                self.emit(segment, opcode as i32);
                self.emit(segment, index as i32);
                pos += 2;
            } else if let Some(index) = self.inputs.iter().position(|n| n == word) {
                pos = self.parse_input_action(pos, stop, segment, index)?;
            } else if let Some(index) = self.outputs.iter().position(|o| o.name == word) {
                let follower = if pos + 1 < stop {
                    self.tokens[pos + 1].text
                } else {
                    ""
                };
                match follower {
                    "<-" => {
                        if pos + 2 < stop && self.tokens[pos + 2].text == "stack" {
                            self.emit(segment, Opcode::Write as i32);
                            self.emit(segment, index as i32);
                            pos += 3;
                        } else {
                            return Err(self.error_at(pos, pos + 3, "missing 'stack' after '<-'"));
                        }
                    }
                    "len" => {
                        self.emit(segment, Opcode::LenOutput as i32);
                        self.emit(segment, index as i32);
                        pos += 2;
                    }
                    "rewind" => {
                        self.emit(segment, Opcode::Rewind as i32);
                        self.emit(segment, index as i32);
                        pos += 2;
                    }
                    _ => {
                        return Err(self.error_at(
                            pos,
                            pos + 2,
                            "missing '<- stack', 'len', or 'rewind' after output name",
                        ));
                    }
                }
            } else if let Some(opcode) = builtin_opcode(word) {
                if word == "i" && do_depth < 1 {
                    return Err(self.error_at(pos, pos + 1, "only allowed in a 'do' loop"));
                }
                if word == "j" && do_depth < 2 {
                    return Err(self.error_at(pos, pos + 1, "only allowed in a nested 'do' loop"));
                }
                if word == "k" && do_depth < 3 {
                    return Err(self.error_at(
                        pos,
                        pos + 1,
                        "only allowed in a doubly nested 'do' loop",
                    ));
                }
                self.emit(segment, opcode as i32);
                pos += 1;
            } else if let Some(index) = self.dictionary.iter().position(|e| e.name == word) {
                let reference = self.dictionary[index].reference;
                self.emit(segment, reference);
                pos += 1;
            } else if let Some(value) = parse_integer(word) {
                self.emit(segment, Opcode::Literal as i32);
                self.emit(segment, value as i32);
                pos += 1;
            } else {
                return Err(self.error_at(
                    pos,
                    pos + 1,
                    "unrecognized word or wrong context for word",
                ));
            }
        }
        Ok(())
    }

    /// Compile the action following an input name: a positioning word or a
    /// parser spec like `#!i-> dest`. Returns the next token position.
    fn parse_input_action(
        &mut self,
        pos: usize,
        stop: usize,
        segment: usize,
        input_index: usize,
    ) -> Result<usize, CompileError> {
        let follower = if pos + 1 < stop {
            self.tokens[pos + 1].text
        } else {
            return Err(self.error_at(
                pos,
                pos + 3,
                "missing '*-> stack/output', 'seek', 'skip', 'end', 'pos', or 'len' after input name",
            ));
        };

        let positioning = match follower {
            "len" => Some(Opcode::LenInput),
            "pos" => Some(Opcode::Pos),
            "end" => Some(Opcode::End),
            "seek" => Some(Opcode::Seek),
            "skip" => Some(Opcode::Skip),
            _ => None,
        };
        if let Some(opcode) = positioning {
            self.emit(segment, opcode as i32);
            self.emit(segment, input_index as i32);
            return Ok(pos + 2);
        }

        let mut parser = follower;
        let repeated = parser.starts_with('#');
        if repeated {
            parser = &parser[1..];
        }
        let big_endian = parser.starts_with('!');
        if big_endian {
            parser = &parser[1..];
        }
        let dtype = parser
            .chars()
            .next()
            .and_then(ReadSpec::dtype_for_letter);
        let Some(dtype) = dtype else {
            return Err(self.error_at(
                pos,
                pos + 3,
                "missing '*-> stack/output', 'seek', 'skip', 'end', 'pos', or 'len' after input name",
            ));
        };
        if &parser[1..] != "->" {
            return Err(self.error_at(
                pos,
                pos + 3,
                "missing '*-> stack/output', 'seek', 'skip', 'end', 'pos', or 'len' after input name",
            ));
        }

        let target = if pos + 2 < stop {
            self.tokens[pos + 2].text
        } else {
            return Err(self.error_at(pos, pos + 3, "missing 'stack' or 'output' after '*->'"));
        };
        let output_index = if target == "stack" {
            None
        } else if let Some(index) = self.outputs.iter().position(|o| o.name == target) {
            Some(index)
        } else {
            return Err(self.error_at(pos, pos + 3, "missing 'stack' or 'output' after '*->'"));
        };

        let spec = ReadSpec {
            repeated,
            big_endian,
            direct: output_index.is_some(),
            dtype,
        };
        self.emit(segment, spec.encode());
        self.emit(segment, input_index as i32);
        if let Some(index) = output_index {
            self.emit(segment, index as i32);
        }
        Ok(pos + 3)
    }

    fn add_segment(&mut self) -> usize {
        self.segments.push(Vec::new());
        self.segments.len() - 1
    }

    fn emit(&mut self, segment: usize, word: i32) {
        self.segments[segment].push(word);
    }

    /// Reject a declaration name that collides with anything nameable.
    fn check_new_name(&self, pos: usize, name: &str) -> Result<(), CompileError> {
        let taken = self.variables.iter().any(|n| n == name)
            || self.inputs.iter().any(|n| n == name)
            || self.outputs.iter().any(|o| o.name == name)
            || self.dictionary.iter().any(|e| e.name == name)
            || is_reserved(name)
            || parse_integer(name).is_some();
        if taken {
            Err(self.error_at(
                pos,
                pos + 2,
                "input names, output names, variable names, and user-defined words \
                 must all be unique and not reserved words or integers",
            ))
        } else {
            Ok(())
        }
    }

    /// Build a compile error pointing at `tokens[start..stop]`.
    fn error_at(&self, start: usize, stop: usize, message: &str) -> CompileError {
        let (line, column, begin) = match self.tokens.get(start) {
            Some(token) => (token.line, token.column, token.offset),
            None => (
                self.tokens.last().map_or(1, |t| t.line),
                self.tokens.last().map_or(0, |t| t.column),
                self.source.len(),
            ),
        };
        let end = self
            .tokens
            .get(stop)
            .map_or(self.source.len(), |token| token.offset);
        let snippet = self.source[begin..end.max(begin)].trim_end().to_string();
        CompileError {
            line,
            column,
            message: message.to_string(),
            snippet,
        }
    }
}

/// Generic builtin words that compile to a single nullary opcode.
fn builtin_opcode(word: &str) -> Option<Opcode> {
    Some(match word {
        // loop indices
        "i" => Opcode::I,
        "j" => Opcode::J,
        "k" => Opcode::K,
        // stack manipulation
        "dup" => Opcode::Dup,
        "drop" => Opcode::Drop,
        "swap" => Opcode::Swap,
        "over" => Opcode::Over,
        "rot" => Opcode::Rot,
        "nip" => Opcode::Nip,
        "tuck" => Opcode::Tuck,
        // arithmetic
        "+" => Opcode::Add,
        "-" => Opcode::Sub,
        "*" => Opcode::Mul,
        "/" => Opcode::Div,
        "mod" => Opcode::Mod,
        "/mod" => Opcode::DivMod,
        "negate" => Opcode::Negate,
        "1+" => Opcode::Add1,
        "1-" => Opcode::Sub1,
        "abs" => Opcode::Abs,
        "min" => Opcode::Min,
        "max" => Opcode::Max,
        // comparisons
        "=" => Opcode::Eq,
        "<>" => Opcode::Ne,
        ">" => Opcode::Gt,
        ">=" => Opcode::Ge,
        "<" => Opcode::Lt,
        "<=" => Opcode::Le,
        "0=" => Opcode::EqZero,
        // bitwise
        "invert" => Opcode::Invert,
        "and" => Opcode::And,
        "or" => Opcode::Or,
        "xor" => Opcode::Xor,
        "lshift" => Opcode::Lshift,
        "rshift" => Opcode::Rshift,
        // constants
        "false" => Opcode::False,
        "true" => Opcode::True,
        _ => return None,
    })
}

/// Whether a word can never be a declared name.
fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
        || is_parser_word(word)
        || Dtype::from_keyword(word).is_some()
        || builtin_opcode(word).is_some()
}

/// Parser specs look like `i->`, `!q->`, `#H->`, `#!d->`.
fn is_parser_word(word: &str) -> bool {
    let rest = word.strip_prefix('#').unwrap_or(word);
    let rest = rest.strip_prefix('!').unwrap_or(rest);
    let mut chars = rest.chars();
    chars.next().is_some_and(|c| ReadSpec::dtype_for_letter(c).is_some()) && chars.as_str() == "->"
}

/// Decimal (optionally negative) or `0x` hexadecimal integer literal.
fn parse_integer(word: &str) -> Option<i64> {
    if let Some(hex) = word.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok().map(|v| v as i64)
    } else {
        word.parse::<i64>()
            .ok()
            .or_else(|| word.parse::<u64>().ok().map(|v| v as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_parsing() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("-7"), Some(-7));
        assert_eq!(parse_integer("0x10"), Some(16));
        assert_eq!(parse_integer("0xffffffffffffffff"), Some(-1));
        assert_eq!(parse_integer("12three"), None);
        assert_eq!(parse_integer("word"), None);
    }

    #[test]
    fn test_parser_word_shapes() {
        for word in ["i->", "!q->", "#H->", "#!d->", "?->"] {
            assert!(is_parser_word(word), "{word}");
        }
        for word in ["->", "x->", "#i", "i ->", "len"] {
            assert!(!is_parser_word(word), "{word}");
        }
    }

    #[test]
    fn test_literals_and_builtins() {
        let bytecode = compile("3 4 +").unwrap();
        assert_eq!(bytecode.segment_count(), 1);
        assert_eq!(
            bytecode.segment(0),
            &[
                Opcode::Literal as i32,
                3,
                Opcode::Literal as i32,
                4,
                Opcode::Add as i32
            ]
        );
    }

    #[test]
    fn test_comments_compile_to_nothing() {
        let bytecode = compile("( a ( nested ) comment ) \\ to end of line\n1").unwrap();
        assert_eq!(bytecode.segment(0), &[Opcode::Literal as i32, 1]);
    }

    #[test]
    fn test_definition_gets_own_segment() {
        let bytecode = compile(": sq dup * ; 7 sq").unwrap();
        assert_eq!(bytecode.segment_count(), 2);
        assert_eq!(bytecode.dictionary().len(), 1);
        assert_eq!(bytecode.dictionary()[0].name, "sq");
        let reference = bytecode.dictionary()[0].reference;
        assert_eq!(reference, DICTIONARY_BASE + 1);
        assert_eq!(
            bytecode.segment(0),
            &[Opcode::Literal as i32, 7, reference]
        );
        assert_eq!(
            bytecode.segment(1),
            &[Opcode::Dup as i32, Opcode::Mul as i32]
        );
    }

    #[test]
    fn test_if_else_segments() {
        let bytecode = compile("1 if 2 else 3 then").unwrap();
        assert_eq!(bytecode.segment_count(), 3);
        assert_eq!(
            bytecode.segment(0),
            &[
                Opcode::Literal as i32,
                1,
                Opcode::IfElse as i32,
                DICTIONARY_BASE + 1,
                DICTIONARY_BASE + 2
            ]
        );
    }

    #[test]
    fn test_begin_loop_shapes() {
        let again = compile("begin 1 again").unwrap();
        assert_eq!(
            again.segment(0),
            &[DICTIONARY_BASE + 1, Opcode::Again as i32]
        );

        let until = compile("begin 1 until").unwrap();
        assert_eq!(
            until.segment(0),
            &[DICTIONARY_BASE + 1, Opcode::Until as i32]
        );

        let repeat = compile("begin 1 while 2 repeat").unwrap();
        assert_eq!(
            repeat.segment(0),
            &[
                DICTIONARY_BASE + 1,
                Opcode::While as i32,
                DICTIONARY_BASE + 2
            ]
        );
    }

    #[test]
    fn test_exit_depth_tracks_blocks() {
        let bytecode = compile(": w exit if exit then ;").unwrap();
        // body segment: [Exit 0, If, ref]; if-block segment: [Exit 1]
        assert_eq!(
            bytecode.segment(1),
            &[
                Opcode::Exit as i32,
                0,
                Opcode::If as i32,
                DICTIONARY_BASE + 2
            ]
        );
        assert_eq!(bytecode.segment(2), &[Opcode::Exit as i32, 1]);
    }

    #[test]
    fn test_variable_accessors() {
        let bytecode = compile("variable x 5 x ! x @ x +!").unwrap();
        assert_eq!(bytecode.variables(), &["x".to_string()]);
        assert_eq!(
            bytecode.segment(0),
            &[
                Opcode::Literal as i32,
                5,
                Opcode::Put as i32,
                0,
                Opcode::Get as i32,
                0,
                Opcode::Inc as i32,
                0
            ]
        );
    }

    #[test]
    fn test_input_read_encodings() {
        let bytecode = compile("input data output col float64 data #!q-> col data i-> stack").unwrap();
        let direct = ReadSpec {
            repeated: true,
            big_endian: true,
            direct: true,
            dtype: Dtype::Int64,
        };
        let to_stack = ReadSpec {
            repeated: false,
            big_endian: false,
            direct: false,
            dtype: Dtype::Int32,
        };
        assert_eq!(
            bytecode.segment(0),
            &[direct.encode(), 0, 0, to_stack.encode(), 0]
        );
    }

    #[test]
    fn test_input_positioning_words() {
        let bytecode = compile("input in in len in pos in end 4 in seek 2 in skip").unwrap();
        assert_eq!(
            bytecode.segment(0),
            &[
                Opcode::LenInput as i32,
                0,
                Opcode::Pos as i32,
                0,
                Opcode::End as i32,
                0,
                Opcode::Literal as i32,
                4,
                Opcode::Seek as i32,
                0,
                Opcode::Literal as i32,
                2,
                Opcode::Skip as i32,
                0
            ]
        );
    }

    #[test]
    fn test_output_actions() {
        let bytecode = compile("output o int32 5 o <- stack o len 1 o rewind").unwrap();
        assert_eq!(
            bytecode.segment(0),
            &[
                Opcode::Literal as i32,
                5,
                Opcode::Write as i32,
                0,
                Opcode::LenOutput as i32,
                0,
                Opcode::Literal as i32,
                1,
                Opcode::Rewind as i32,
                0
            ]
        );
    }

    #[test]
    fn test_error_locations() {
        let err = compile("1 2\nbogus").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 0);
        assert!(err.snippet.contains("bogus"));
        assert!(err.message.contains("unrecognized word"));
    }

    #[test]
    fn test_unclosed_blocks() {
        assert!(compile("( never closed").is_err());
        assert!(compile(": w 1 2").is_err());
        assert!(compile("1 if 2").is_err());
        assert!(compile("0 5 do i").is_err());
        assert!(compile("begin 1").is_err());
        assert!(compile("begin 1 while 2").is_err());
    }

    #[test]
    fn test_name_collisions() {
        assert!(compile("variable x variable x").is_err());
        assert!(compile("variable dup").is_err());
        assert!(compile("input 42").is_err());
        assert!(compile("output if int32").is_err());
        assert!(compile(": x 1 ; variable x").is_err());
        assert!(compile("variable i->").is_err());
        assert!(compile("output o bogus32").is_err());
    }

    #[test]
    fn test_context_requirements() {
        assert!(compile("recurse").is_err());
        assert!(compile("i").is_err());
        assert!(compile("0 5 do j loop").is_err());
        assert!(compile("0 5 do 0 5 do j loop loop").is_ok());
        assert!(compile("0 5 do k loop").is_err());
        assert!(compile("variable x x").is_err());
        assert!(compile("input in in").is_err());
        assert!(compile("output o int8 o").is_err());
        assert!(compile("input in in x->").is_err());
    }

    #[test]
    fn test_recursion_compiles_to_self_reference() {
        let bytecode = compile(": countdown dup 0= if exit then 1- recurse ;").unwrap();
        let reference = bytecode.dictionary()[0].reference;
        let body = bytecode.segment(1);
        assert_eq!(body.last(), Some(&reference));
    }
}
