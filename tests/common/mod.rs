//! Shared `Employee` model for the integration tests.
//!
//! Every computed member is assembled with the IL shape the C# compiler emits for it, so the
//! tests exercise the same instruction sequences a real assembly would contain.

#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use dotinline::{
    decompiler::{Decompiler, DecompilerOptions, EligibilityRegistry, MarkerKind},
    disassembler::{Immediate, InstructionEncoder, Operand},
    expression::{Expr, ParameterExpr},
    metadata::{FieldRc, FieldRef, MetadataTable, MethodFlags, MethodRc, MethodRef, TypeSignature},
    Result,
};

/// The employee type, its computed members and the metadata they live in.
pub struct Model {
    pub employee: TypeSignature,
    pub table: Arc<MetadataTable>,
    pub registry: EligibilityRegistry,
    fields: HashMap<&'static str, FieldRc>,
    methods: HashMap<&'static str, MethodRc>,
}

fn assemble(
    table: &mut MetadataTable,
    method: &MethodRc,
    locals: Vec<TypeSignature>,
    build: impl FnOnce(&mut InstructionEncoder) -> Result<()>,
) -> Result<()> {
    let mut il = InstructionEncoder::new();
    build(&mut il)?;
    table.set_body(method, il.finalize()?, locals);
    Ok(())
}

fn static_method(declaring_type: &TypeSignature, name: &str) -> MethodRef {
    MethodRef::new(declaring_type.clone(), name).with_flags(MethodFlags::STATIC)
}

impl Model {
    /// Builds the model with every member registered except the ones only reachable through
    /// the computed marker (`FullNameWithoutAttribute` and the `FullName()` extension).
    pub fn build() -> Result<Self> {
        let employee = TypeSignature::class("Employee");
        let reference = TypeSignature::value_type("EmployeeReference");
        let date = TypeSignature::value_type("DateTime");
        let short = TypeSignature::nullable(TypeSignature::I2);
        let nullable_int = TypeSignature::nullable(TypeSignature::I4);
        let nullable_date = TypeSignature::nullable(date.clone());
        let extensions = TypeSignature::class("EmployeeExtensions");
        let markers = TypeSignature::class("ComputedExtensions");

        let mut table = MetadataTable::new();
        let mut fields = HashMap::new();
        let mut methods = HashMap::new();

        for (name, ty) in [
            ("FirstName", TypeSignature::String),
            ("MiddleName", TypeSignature::String),
            ("LastName", TypeSignature::String),
            ("Id", TypeSignature::I4),
            ("From", TypeSignature::I4),
            ("To", TypeSignature::I4),
            ("Active", TypeSignature::Boolean),
            ("Reference", reference.clone()),
            ("MyField", short.clone()),
            ("NullableDate", nullable_date.clone()),
            ("NullableInt", nullable_int.clone()),
        ] {
            fields.insert(name, table.add_field(FieldRef::new(employee.clone(), name, ty)));
        }
        let field = |name: &str| fields[name].token;

        // Framework members
        let concat3 = table.add_method(
            static_method(&TypeSignature::String, "Concat")
                .param("str0", TypeSignature::String)
                .param("str1", TypeSignature::String)
                .param("str2", TypeSignature::String)
                .returns(TypeSignature::String),
        );
        let concat4 = table.add_method(
            static_method(&TypeSignature::String, "Concat")
                .param("str0", TypeSignature::String)
                .param("str1", TypeSignature::String)
                .param("str2", TypeSignature::String)
                .param("str3", TypeSignature::String)
                .returns(TypeSignature::String),
        );
        let concat_array = table.add_method(
            static_method(&TypeSignature::String, "Concat")
                .param("values", TypeSignature::SzArray(Box::new(TypeSignature::String)))
                .returns(TypeSignature::String),
        );
        let concat_objects = table.add_method(
            static_method(&TypeSignature::String, "Concat")
                .param("arg0", TypeSignature::Object)
                .param("arg1", TypeSignature::Object)
                .param("arg2", TypeSignature::Object)
                .returns(TypeSignature::String),
        );
        let count = table.add_method(MethodRef::getter(reference, "Count", TypeSignature::I4));
        let short_has_value = table.add_method(MethodRef::getter(short.clone(), "HasValue", TypeSignature::Boolean));
        let short_value = table.add_method(MethodRef::getter(short, "Value", TypeSignature::I2));
        let date_has_value =
            table.add_method(MethodRef::getter(nullable_date.clone(), "HasValue", TypeSignature::Boolean));
        let date_value = table.add_method(MethodRef::getter(nullable_date, "Value", date.clone()));
        let int_has_value =
            table.add_method(MethodRef::getter(nullable_int.clone(), "HasValue", TypeSignature::Boolean));
        let int_value = table.add_method(MethodRef::getter(nullable_int, "Value", TypeSignature::I4));
        let add_days = table.add_method(
            MethodRef::new(date.clone(), "AddDays")
                .param("value", TypeSignature::R8)
                .returns(date.clone()),
        );
        let now = table.add_method(
            MethodRef::getter(date.clone(), "Now", date.clone()).with_flags(MethodFlags::STATIC),
        );
        let date_greater = table.add_method(
            static_method(&date, "op_GreaterThan")
                .param("t1", date.clone())
                .param("t2", date)
                .returns(TypeSignature::Boolean),
        );

        let int_type = table.add_type(TypeSignature::I4);
        let string_type = table.add_type(TypeSignature::String);
        let space = table.add_string(" ");
        let dash = table.add_string("-");
        let senior = table.add_string("senior");
        let junior = table.add_string("junior");

        let mut getter = |table: &mut MetadataTable, name: &'static str, ty: TypeSignature| {
            let method = table.add_method(MethodRef::getter(employee.clone(), name, ty));
            methods.insert(name, method.clone());
            method
        };

        // FirstName + " " + LastName
        let full_name_shape = |il: &mut InstructionEncoder| -> Result<()> {
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("FirstName"))?;
            il.emit_token("ldstr", space)?;
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("LastName"))?;
            il.emit_token("call", concat3.token)?;
            il.emit_instruction("ret", None)
        };

        let full_name = getter(&mut table, "FullName", TypeSignature::String);
        assemble(&mut table, &full_name, Vec::new(), full_name_shape)?;

        let without_attribute = getter(&mut table, "FullNameWithoutAttribute", TypeSignature::String);
        assemble(&mut table, &without_attribute, Vec::new(), full_name_shape)?;

        // From + "-" + To
        let from_to = getter(&mut table, "FromTo", TypeSignature::String);
        assemble(&mut table, &from_to, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("From"))?;
            il.emit_token("box", int_type)?;
            il.emit_token("ldstr", dash)?;
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("To"))?;
            il.emit_token("box", int_type)?;
            il.emit_token("call", concat_objects.token)?;
            il.emit_instruction("ret", None)
        })?;

        // true
        let is_active = getter(&mut table, "IsActive", TypeSignature::Boolean);
        assemble(&mut table, &is_active, Vec::new(), |il| {
            il.emit_ldc_i4(1)?;
            il.emit_instruction("ret", None)
        })?;

        // Reference.Count, through the field's address
        let count_of = getter(&mut table, "Count", TypeSignature::I4);
        assemble(&mut table, &count_of, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("ldflda", field("Reference"))?;
            il.emit_token("call", count.token)?;
            il.emit_instruction("ret", None)
        })?;

        // DeeperName => FullName, TooDeepName => DeeperName
        let deeper = getter(&mut table, "DeeperName", TypeSignature::String);
        assemble(&mut table, &deeper, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("call", full_name.token)?;
            il.emit_instruction("ret", None)
        })?;
        let too_deep = getter(&mut table, "TooDeepName", TypeSignature::String);
        assemble(&mut table, &too_deep, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("call", deeper.token)?;
            il.emit_instruction("ret", None)
        })?;

        // Id <= 3 ? (Id > 3 ? 3 : 2) : 1
        let complex = getter(&mut table, "ComplexProperty", TypeSignature::I4);
        assemble(&mut table, &complex, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("Id"))?;
            il.emit_ldc_i4(3)?;
            il.emit_branch("ble.s", "inner")?;
            il.emit_ldc_i4(1)?;
            il.emit_branch("br.s", "end")?;
            il.define_label("inner")?;
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("Id"))?;
            il.emit_ldc_i4(3)?;
            il.emit_branch("bgt.s", "three")?;
            il.emit_ldc_i4(2)?;
            il.emit_branch("br.s", "end")?;
            il.define_label("three")?;
            il.emit_ldc_i4(3)?;
            il.define_label("end")?;
            il.emit_instruction("ret", None)
        })?;

        // Active ? 10 : 20
        let level = getter(&mut table, "Level", TypeSignature::I4);
        assemble(&mut table, &level, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("Active"))?;
            il.emit_branch("brtrue.s", "ten")?;
            il.emit_ldc_i4(20)?;
            il.emit_branch("br.s", "end")?;
            il.define_label("ten")?;
            il.emit_ldc_i4(10)?;
            il.define_label("end")?;
            il.emit_instruction("ret", None)
        })?;

        // (Active || Id > 100) && Id < 500
        let is_listed = getter(&mut table, "IsListed", TypeSignature::Boolean);
        assemble(&mut table, &is_listed, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("Active"))?;
            il.emit_branch("brtrue.s", "range")?;
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("Id"))?;
            il.emit_ldc_i4(100)?;
            il.emit_branch("ble.s", "no")?;
            il.define_label("range")?;
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("Id"))?;
            il.emit_ldc_i4(500)?;
            il.emit_instruction("clt", None)?;
            il.emit_instruction("ret", None)?;
            il.define_label("no")?;
            il.emit_ldc_i4(0)?;
            il.emit_instruction("ret", None)
        })?;

        // MyField.HasValue ? MyField.Value : (short)0
        let the_bad = getter(&mut table, "TheBad", TypeSignature::I2);
        assemble(&mut table, &the_bad, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("ldflda", field("MyField"))?;
            il.emit_token("call", short_has_value.token)?;
            il.emit_branch("brtrue.s", "value")?;
            il.emit_ldc_i4(0)?;
            il.emit_branch("br.s", "end")?;
            il.define_label("value")?;
            il.emit_ldarg(0)?;
            il.emit_token("ldflda", field("MyField"))?;
            il.emit_token("call", short_value.token)?;
            il.define_label("end")?;
            il.emit_instruction("ret", None)
        })?;

        // MiddleName ?? FirstName
        let preferred = getter(&mut table, "PreferredName", TypeSignature::String);
        assemble(&mut table, &preferred, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("MiddleName"))?;
            il.emit_instruction("dup", None)?;
            il.emit_branch("brtrue.s", "end")?;
            il.emit_instruction("pop", None)?;
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("FirstName"))?;
            il.define_label("end")?;
            il.emit_instruction("ret", None)
        })?;

        // Active && Id > 10
        let is_senior = getter(&mut table, "IsSenior", TypeSignature::Boolean);
        assemble(&mut table, &is_senior, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("Active"))?;
            il.emit_branch("brfalse.s", "no")?;
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("Id"))?;
            il.emit_ldc_i4(10)?;
            il.emit_instruction("cgt", None)?;
            il.emit_instruction("ret", None)?;
            il.define_label("no")?;
            il.emit_ldc_i4(0)?;
            il.emit_instruction("ret", None)
        })?;

        // if (Active && Id > 10) return "senior"; return "junior";
        let band = getter(&mut table, "Band", TypeSignature::String);
        assemble(&mut table, &band, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("Active"))?;
            il.emit_branch("brfalse.s", "junior")?;
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("Id"))?;
            il.emit_ldc_i4(10)?;
            il.emit_branch("ble.s", "junior")?;
            il.emit_token("ldstr", senior)?;
            il.emit_instruction("ret", None)?;
            il.define_label("junior")?;
            il.emit_token("ldstr", junior)?;
            il.emit_instruction("ret", None)
        })?;

        // NullableDate.HasValue && NullableInt.HasValue
        //     && NullableDate.Value.AddDays(NullableInt.Value) > DateTime.Now
        // as emitted with the date copied to a temporary on one path only
        let test = getter(&mut table, "Test", TypeSignature::Boolean);
        assemble(&mut table, &test, vec![TypeSignature::value_type("DateTime")], |il| {
            il.emit_ldarg(0)?;
            il.emit_token("ldflda", field("NullableDate"))?;
            il.emit_token("call", date_has_value.token)?;
            il.emit_branch("brfalse.s", "no_date")?;
            il.emit_ldarg(0)?;
            il.emit_token("ldflda", field("NullableDate"))?;
            il.emit_token("call", date_value.token)?;
            il.emit_stloc(0)?;
            il.define_label("no_date")?;
            il.emit_ldarg(0)?;
            il.emit_token("ldflda", field("NullableInt"))?;
            il.emit_token("call", int_has_value.token)?;
            il.emit_branch("brfalse.s", "no")?;
            il.emit_instruction("ldloca.s", Some(Operand::Immediate(Immediate::UInt8(0))))?;
            il.emit_ldarg(0)?;
            il.emit_token("ldflda", field("NullableInt"))?;
            il.emit_token("call", int_value.token)?;
            il.emit_instruction("conv.r8", None)?;
            il.emit_token("call", add_days.token)?;
            il.emit_token("call", now.token)?;
            il.emit_token("call", date_greater.token)?;
            il.emit_instruction("ret", None)?;
            il.define_label("no")?;
            il.emit_ldc_i4(0)?;
            il.emit_instruction("ret", None)
        })?;

        // Ping => Pong, Pong => Ping
        let ping = getter(&mut table, "Ping", TypeSignature::I4);
        let pong = getter(&mut table, "Pong", TypeSignature::I4);
        for (from, to) in [(&ping, &pong), (&pong, &ping)] {
            assemble(&mut table, from, Vec::new(), |il| {
                il.emit_ldarg(0)?;
                il.emit_token("call", to.token)?;
                il.emit_instruction("ret", None)
            })?;
        }

        // FullNameMethod overloads
        let full_name_method = table.add_method(
            MethodRef::new(employee.clone(), "FullNameMethod").returns(TypeSignature::String),
        );
        assemble(&mut table, &full_name_method, Vec::new(), full_name_shape)?;
        methods.insert("FullNameMethod()", full_name_method);

        let with_prefix = table.add_method(
            MethodRef::new(employee.clone(), "FullNameMethod")
                .param("prefix", TypeSignature::String)
                .returns(TypeSignature::String),
        );
        assemble(&mut table, &with_prefix, Vec::new(), |il| {
            il.emit_ldarg(1)?;
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("FirstName"))?;
            il.emit_token("ldstr", space)?;
            il.emit_ldarg(0)?;
            il.emit_token("ldfld", field("LastName"))?;
            il.emit_token("call", concat4.token)?;
            il.emit_instruction("ret", None)
        })?;
        methods.insert("FullNameMethod(prefix)", with_prefix);

        let with_both = table.add_method(
            MethodRef::new(employee.clone(), "FullNameMethod")
                .param("prefix", TypeSignature::String)
                .param("suffix", TypeSignature::String)
                .returns(TypeSignature::String),
        );
        assemble(&mut table, &with_both, Vec::new(), |il| {
            il.emit_ldc_i4(5)?;
            il.emit_token("newarr", string_type)?;
            let element = |il: &mut InstructionEncoder,
                               index: i32,
                               load: &dyn Fn(&mut InstructionEncoder) -> Result<()>|
             -> Result<()> {
                il.emit_instruction("dup", None)?;
                il.emit_ldc_i4(index)?;
                load(il)?;
                il.emit_instruction("stelem.ref", None)
            };
            element(il, 0, &|il: &mut InstructionEncoder| il.emit_ldarg(1))?;
            element(il, 1, &|il: &mut InstructionEncoder| {
                il.emit_ldarg(0)?;
                il.emit_token("ldfld", field("FirstName"))
            })?;
            element(il, 2, &|il: &mut InstructionEncoder| il.emit_token("ldstr", space))?;
            element(il, 3, &|il: &mut InstructionEncoder| {
                il.emit_ldarg(0)?;
                il.emit_token("ldfld", field("LastName"))
            })?;
            element(il, 4, &|il: &mut InstructionEncoder| il.emit_ldarg(2))?;
            il.emit_token("call", concat_array.token)?;
            il.emit_instruction("ret", None)
        })?;
        methods.insert("FullNameMethod(prefix, suffix)", with_both);

        // static string FullName(this Employee employee) => employee.FullName
        let extension = table.add_method(
            static_method(&extensions, "FullName")
                .param("employee", employee.clone())
                .returns(TypeSignature::String)
                .with_flags(MethodFlags::EXTENSION),
        );
        assemble(&mut table, &extension, Vec::new(), |il| {
            il.emit_ldarg(0)?;
            il.emit_token("callvirt", full_name.token)?;
            il.emit_instruction("ret", None)
        })?;
        methods.insert("FullName()", extension);

        for name in ["Computed", "Opaque"] {
            methods.insert(
                name,
                Arc::new(
                    static_method(&markers, name)
                        .param("value", TypeSignature::Object)
                        .returns(TypeSignature::Object)
                        .with_flags(MethodFlags::EXTENSION),
                ),
            );
        }

        let mut registry = [
            "FullName",
            "FromTo",
            "IsActive",
            "Count",
            "DeeperName",
            "TooDeepName",
            "ComplexProperty",
            "Level",
            "IsListed",
            "TheBad",
            "PreferredName",
            "IsSenior",
            "Band",
            "Test",
            "Ping",
            "Pong",
            "FullNameMethod()",
            "FullNameMethod(prefix)",
            "FullNameMethod(prefix, suffix)",
        ]
        .into_iter()
        .fold(EligibilityRegistry::new(), |registry, name| {
            registry.with(methods[name].clone())
        });
        registry.register_marker(&markers, "Computed", MarkerKind::Computed);
        registry.register_marker(&markers, "Opaque", MarkerKind::Opaque);

        Ok(Model {
            employee,
            table: Arc::new(table),
            registry,
            fields,
            methods,
        })
    }

    /// A decompiler with its own cache.
    pub fn decompiler(&self) -> Decompiler {
        Decompiler::for_table(self.table.clone(), self.registry.clone())
    }

    /// A decompiler with its own cache and explicit options.
    pub fn decompiler_with(&self, options: DecompilerOptions) -> Decompiler {
        Decompiler::with_options(
            self.table.clone(),
            self.table.clone(),
            self.registry.clone(),
            options,
        )
    }

    /// A member by property or overload name.
    pub fn method(&self, name: &str) -> MethodRc {
        self.methods
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("no member named {name}"))
    }

    /// A lambda parameter of the employee type.
    pub fn param(&self, name: &str) -> ParameterExpr {
        ParameterExpr::new(name, self.employee.clone())
    }

    /// `target.Name` for a field of the model.
    pub fn field(&self, target: &ParameterExpr, name: &str) -> Expr {
        Expr::field(Some(target.expr()), self.fields[name].clone())
    }

    /// `target.Name` for a computed property of the model.
    pub fn property(&self, target: &ParameterExpr, name: &str) -> Expr {
        Expr::property(Some(target.expr()), self.method(name))
    }

    /// `value.Computed()`
    pub fn computed(&self, value: Expr) -> Expr {
        Expr::call(None, self.method("Computed"), vec![value])
    }

    /// `value.Opaque()`
    pub fn opaque(&self, value: Expr) -> Expr {
        Expr::call(None, self.method("Opaque"), vec![value])
    }

    /// `FirstName + " " + LastName` written against `target` directly.
    pub fn full_name_of(&self, target: &ParameterExpr) -> Expr {
        use dotinline::expression::BinaryOp;

        Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Add, self.field(target, "FirstName"), Expr::string(" ")),
            self.field(target, "LastName"),
        )
    }
}
