//! Reference counting instructions around variables and temporaries.
//!
//! Every object a temporary or variable refers to is retained once per
//! holder and registered to the scope that owes its release. Assignment
//! retains the new value before releasing the old one, so rebinding a
//! variable to its own object never frees it. A departure from the
//! operation exits every open scope first.

use crate::ir::{DebugInfo, IrInstr};

pub struct VariableMemoryManagement {
    debug_info: Option<DebugInfo>,
}

impl VariableMemoryManagement {
    pub fn new(debug_info: Option<DebugInfo>) -> Self { Self { debug_info } }

    fn instr(&self, instr: IrInstr) -> IrInstr { instr.with_debug_info(self.debug_info.clone()) }

    /// A new object bound to `temp` is owned by `scope`.
    pub fn retain_and_register(&self, temp: &str, scope: &str, out: &mut Vec<IrInstr>) {
        out.push(self.instr(IrInstr::retain(temp)));
        out.push(self.instr(IrInstr::scope_register(temp, scope)));
    }

    /// Declare `name`, which `scope` releases on exit.
    pub fn declare(&self, name: &str, ty: &str, scope: &str, out: &mut Vec<IrInstr>) {
        out.push(self.instr(IrInstr::reference(name, ty)));
        out.push(self.instr(IrInstr::scope_register(name, scope)));
    }

    /// Bind a freshly declared `name` to the object of `value`.
    pub fn initialise(&self, name: &str, value: &str, out: &mut Vec<IrInstr>) {
        out.push(self.instr(IrInstr::store(name, value)));
        out.push(self.instr(IrInstr::retain(name)));
    }

    /// Rebind `name`, dropping its hold on the previous object.
    pub fn assign(&self, name: &str, value: &str, out: &mut Vec<IrInstr>) {
        out.push(self.instr(IrInstr::retain(value)));
        out.push(self.instr(IrInstr::release(name)));
        out.push(self.instr(IrInstr::store(name, value)));
    }

    /// Exit `scopes`, given innermost first.
    pub fn exits(&self, scopes: &[String], out: &mut Vec<IrInstr>) {
        out.extend(scopes.iter().map(|scope| self.instr(IrInstr::scope_exit(scope.as_str()))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Opcode;

    #[test]
    fn test_assignment_order() {
        let mut out = Vec::new();
        VariableMemoryManagement::new(None).assign("x", "_temp3", &mut out);
        let opcodes: Vec<Opcode> = out.iter().map(IrInstr::opcode).collect();
        assert_eq!(opcodes, vec![Opcode::Retain, Opcode::Release, Opcode::Store]);
        assert_eq!(out[0].operands()[0], "_temp3");
        assert_eq!(out[2].store_parts(), Some(("x", "_temp3")));
    }

    #[test]
    fn test_exits_keep_given_order() {
        let mut out = Vec::new();
        let scopes = vec!["_scope_3".to_string(), "_scope_1".to_string()];
        VariableMemoryManagement::new(None).exits(&scopes, &mut out);
        assert_eq!(out[0].scope_id(), Some("_scope_3"));
        assert_eq!(out[1].scope_id(), Some("_scope_1"));
    }
}
