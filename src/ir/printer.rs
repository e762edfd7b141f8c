//! Human readable trace of the IR, for debugging and test assertions.
//!
//! The layout is not a wire format and may change.

use std::io;

use super::{
    block::{Block, Body},
    construct::{CompilationUnit, IrConstruct, Operation},
    instr::IrInstr,
};

/// The node kinds the printer can render.
#[derive(Clone, Copy)]
pub enum IrNode<'a> {
    Unit(&'a CompilationUnit),
    Construct(&'a IrConstruct),
    Operation(&'a Operation),
    Block(&'a Body, Block),
    Instr(&'a IrInstr),
}

pub struct NodePrinter<'a, W>
where
    W: io::Write,
{
    buf: &'a mut W,
}

impl<'a, W> NodePrinter<'a, W>
where
    W: io::Write,
{
    pub fn new(buf: &'a mut W) -> Self { Self { buf } }

    pub fn print(&mut self, node: IrNode<'_>) -> io::Result<()> {
        match node {
            IrNode::Unit(unit) => self.print_unit(unit),
            IrNode::Construct(construct) => self.print_construct(construct),
            IrNode::Operation(operation) => self.print_operation(operation),
            IrNode::Block(body, block) => self.print_block(body, block),
            IrNode::Instr(instr) => writeln!(self.buf, "{}", instr),
        }
    }

    fn print_unit(&mut self, unit: &CompilationUnit) -> io::Result<()> {
        writeln!(self.buf, "// module: {}", unit.module_name())?;
        for construct in unit.constructs() {
            writeln!(self.buf)?;
            self.print_construct(construct)?;
        }
        Ok(())
    }

    fn print_construct(&mut self, construct: &IrConstruct) -> io::Result<()> {
        write!(
            self.buf,
            "ConstructDfn: {} ({})",
            construct.name(),
            construct.kind()
        )?;
        match construct.debug_info().filter(|d| d.is_valid_location()) {
            Some(debug_info) => writeln!(self.buf, "  {}", debug_info)?,
            None => writeln!(self.buf)?,
        }
        for field in construct.fields() {
            writeln!(self.buf, "Field: {}, {}", field.name, field.ty)?;
        }
        for operation in construct.operations() {
            writeln!(self.buf)?;
            self.print_operation(operation)?;
        }
        Ok(())
    }

    fn print_operation(&mut self, operation: &Operation) -> io::Result<()> {
        let params: Vec<String> = operation
            .parameters()
            .iter()
            .map(|p| format!("{} as {}", p.name, p.ty))
            .collect();
        write!(
            self.buf,
            "OperationDfn: {}({})->{}",
            operation.name(),
            params.join(", "),
            operation.return_type()
        )?;
        match operation.debug_info().filter(|d| d.is_valid_location()) {
            Some(debug_info) => writeln!(self.buf, "  {}", debug_info)?,
            None => writeln!(self.buf)?,
        }
        writeln!(self.buf, "BasicBlock")?;
        let body = operation.body();
        for block in body.blocks() {
            self.print_block(body, block)?;
        }
        Ok(())
    }

    fn print_block(&mut self, body: &Body, block: Block) -> io::Result<()> {
        write!(self.buf, "{}", block.display(body))
    }
}

/// Render a node to a string.
pub fn render(node: IrNode<'_>) -> String {
    let mut buf = Vec::new();
    NodePrinter::new(&mut buf)
        .print(node)
        .expect("writing to a vector cannot fail");
    String::from_utf8_lossy(&buf).into_owned()
}
