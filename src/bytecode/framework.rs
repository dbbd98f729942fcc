//! Built-in framework assembly
//!
//! Primitive types plus the hardware accessors every program can call.
//! Register accessors compile to direct reads and writes of TIA/RIOT symbols
//! defined in `vcs.h`.

use super::metadata::{Assembly, CallMarker, Intrinsic, MethodDef, Register, TypeDef};
use super::refs::TypeRef;
use lazy_static::lazy_static;

/// Write-only registers: (property, symbol)
const WRITE_REGISTERS: &[(&str, &str)] = &[
    ("AudC0", "AUDC0"),
    ("AudC1", "AUDC1"),
    ("AudF0", "AUDF0"),
    ("AudF1", "AUDF1"),
    ("AudV0", "AUDV0"),
    ("AudV1", "AUDV1"),
    ("ColuBk", "COLUBK"),
    ("ColuP0", "COLUP0"),
    ("ColuP1", "COLUP1"),
    ("ColuPf", "COLUPF"),
    ("CtrlPf", "CTRLPF"),
    ("EnaM0", "ENAM0"),
    ("EnaM1", "ENAM1"),
    ("EnaBl", "ENABL"),
    ("GrP0", "GRP0"),
    ("GrP1", "GRP1"),
    ("HMBl", "HMBL"),
    ("HMP0", "HMP0"),
    ("HMP1", "HMP1"),
    ("HMM0", "HMM0"),
    ("HMM1", "HMM1"),
    ("NuSiz0", "NUSIZ0"),
    ("NuSiz1", "NUSIZ1"),
    ("Pf0", "PF0"),
    ("Pf1", "PF1"),
    ("Pf2", "PF2"),
    ("RefP0", "REFP0"),
    ("RefP1", "REFP1"),
    ("ResMP0", "RESMP0"),
    ("ResMP1", "RESMP1"),
    ("VBlank", "VBLANK"),
    ("VDelP0", "VDELP0"),
    ("VDelP1", "VDELP1"),
    ("VDelBl", "VDELBL"),
    ("VSync", "VSYNC"),
    ("Tim64T", "TIM64T"),
];

/// Strobe registers, written without a value: (method, symbol)
const STROBES: &[(&str, &str)] = &[
    ("CxClr", "CXCLR"),
    ("HmClr", "HMCLR"),
    ("HMove", "HMOVE"),
    ("ResBl", "RESBL"),
    ("ResM0", "RESM0"),
    ("ResM1", "RESM1"),
    ("ResP0", "RESP0"),
    ("ResP1", "RESP1"),
    ("RSync", "RSYNC"),
    ("WSync", "WSYNC"),
];

/// Read-only registers: (property, symbol)
const READ_REGISTERS: &[(&str, &str)] = &[
    ("CxM0P", "CXM0P"),
    ("CxM1P", "CXM1P"),
    ("CxP0FB", "CXP0FB"),
    ("CxP1FB", "CXP1FB"),
    ("CxM0FB", "CXM0FB"),
    ("CxM1FB", "CXM1FB"),
    ("CxBlPf", "CXBLPF"),
    ("CxPPMM", "CXPPMM"),
    ("InTim", "INTIM"),
    ("TimInt", "TIMINT"),
];

fn registers() -> TypeDef {
    let mut ty = TypeDef::new("VCSFramework.Registers");
    for register in [Register::A, Register::X, Register::Y] {
        ty = ty.with_method(
            MethodDef::new(format!("set_{:?}", register))
                .with_parameter("value", TypeRef::byte())
                .with_marker(CallMarker::LoadToRegister { register }),
        );
    }
    for (property, symbol) in WRITE_REGISTERS {
        ty = ty.with_method(
            MethodDef::new(format!("set_{}", property))
                .with_parameter("value", TypeRef::byte())
                .with_marker(CallMarker::StoreToSymbol {
                    symbol: symbol.to_string(),
                }),
        );
    }
    for (method, symbol) in STROBES {
        ty = ty.with_method(MethodDef::new(*method).with_marker(CallMarker::StoreToSymbol {
            symbol: symbol.to_string(),
        }));
    }
    for (property, symbol) in READ_REGISTERS {
        ty = ty.with_method(
            MethodDef::new(format!("get_{}", property))
                .returning(TypeRef::byte())
                .with_marker(CallMarker::LoadFromSymbol {
                    symbol: symbol.to_string(),
                }),
        );
    }
    ty
}

fn intrinsic(name: &str, intrinsic: Intrinsic) -> MethodDef {
    MethodDef::new(name).with_marker(CallMarker::ReplaceWithEntry { intrinsic })
}

fn build_framework() -> Assembly {
    Assembly::new("VCSFramework")
        .with_type(TypeDef::primitive("System.Byte", 1))
        .with_type(TypeDef::primitive("System.SByte", 1))
        .with_type(TypeDef::primitive("System.Boolean", 1))
        .with_type(TypeDef::primitive("System.Void", 0))
        .with_type(TypeDef::primitive("System.String", 0))
        .with_type(TypeDef::primitive("VCSFramework.Nothing", 0))
        .with_type(registers())
        .with_type(
            TypeDef::new("VCSFramework.AssemblyUtilities").with_method(
                intrinsic("InlineAssembly", Intrinsic::InlineAssembly)
                    .with_parameter("assembly", TypeRef::string()),
            ),
        )
        .with_type(
            TypeDef::new("VCSFramework.RomData")
                .with_method(intrinsic("get_Length", Intrinsic::RomDataLength).returning(TypeRef::byte()))
                .with_method(intrinsic("get_Stride", Intrinsic::RomDataStride).returning(TypeRef::byte()))
                .with_method(
                    intrinsic("get_Item", Intrinsic::RomDataGetter)
                        .with_parameter("index", TypeRef::byte())
                        .returning(TypeRef::byte().pointer_to()),
                ),
        )
}

lazy_static! {
    /// The framework assembly shared by every compilation
    pub static ref FRAMEWORK: Assembly = build_framework();
}
