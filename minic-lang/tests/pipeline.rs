use minic_lang::{
    bytecode, compile, parse, parse_recovering, run_source, tokenize, Error, Fault, Instruction,
    Opcode, Value, Vm, VmConfig,
};

fn run(source: &str) -> Vm {
    run_source(source, VmConfig::default()).unwrap()
}

fn local(vm: &Vm, name: &str) -> Value {
    vm.state().locals[name].clone()
}

#[test]
fn test_programs_finish_with_halt() {
    let programs = [
        "int x = 1 + 2",
        "int x = 10; int y = x * 3 - 4; y / 2;",
        "double d = 2.5 * 4;",
        "string s = 'hi'",
        "bool b",
        "",
    ];
    for source in programs {
        let tokens = tokenize(source).unwrap();
        let ast = parse(&tokens).unwrap();
        let code = compile(&ast).unwrap();
        assert_eq!(code.last(), Some(&Instruction::new(Opcode::Halt)), "{}", source);
        let mut vm = Vm::new();
        vm.load(code);
        vm.run().unwrap();
        assert!(vm.state().finished, "{}", source);
    }
}

#[test]
fn test_arithmetic() {
    let vm = run("int x = 10; int y = x * 3 - 4; int z = y / 4; int w = (1 + 2) * 3");
    assert_eq!(local(&vm, "y"), Value::Number(26.0));
    assert_eq!(local(&vm, "z"), Value::Number(6.0));
    assert_eq!(local(&vm, "w"), Value::Number(9.0));
    assert!(vm.state().stack.is_empty());
}

#[test]
fn test_unary_and_comparisons() {
    let vm = run("int a = -3 + !0; int b = 2 <= 2; int c = 1 >= 2; int d = !(1 == 1) != 0");
    assert_eq!(local(&vm, "a"), Value::Number(-2.0));
    assert_eq!(local(&vm, "b"), Value::Number(1.0));
    assert_eq!(local(&vm, "c"), Value::Number(0.0));
    assert_eq!(local(&vm, "d"), Value::Number(0.0));
}

#[test]
fn test_if_else() {
    let vm = run("int x = 7; if (x > 5) int y = 1; else int y = 2;");
    assert_eq!(local(&vm, "y"), Value::Number(1.0));
    let vm = run("int x = 3; if (x > 5) int y = 1; else int y = 2;");
    assert_eq!(local(&vm, "y"), Value::Number(2.0));
    let vm = run("int x = 3; if (x > 5) int y = 1;");
    assert!(!vm.state().locals.contains_key("y"));
}

#[test]
fn test_string_condition_is_truthy() {
    let vm = run("if ('a') int y = 1; else int y = 2;");
    assert_eq!(local(&vm, "y"), Value::Number(1.0));
    let vm = run("string s = ''; while (s) int s = 0;");
    assert_eq!(local(&vm, "s"), Value::Number(0.0));
}

#[test]
fn test_nan_comparisons() {
    let huge = format!("1{}", "0".repeat(400));
    let vm = run(&format!(
        "int a = {huge} - {huge}; int le = a <= 1; int ge = a >= 1; int gt = a > 1; int lt = a < 1;"
    ));
    assert_eq!(vm.state().locals["a"].to_string(), "NaN");
    // <= and >= lower to negated > and <
    assert_eq!(local(&vm, "le"), Value::Number(1.0));
    assert_eq!(local(&vm, "ge"), Value::Number(1.0));
    assert_eq!(local(&vm, "gt"), Value::Number(0.0));
    assert_eq!(local(&vm, "lt"), Value::Number(0.0));
}

#[test]
fn test_while() {
    let vm = run("int n = 1; while (n < 100) int n = n * 2;");
    assert_eq!(local(&vm, "n"), Value::Number(128.0));
    assert!(vm.state().stack.is_empty());
}

#[test]
fn test_return_ends_program() {
    let vm = run("int a = 1; return a + 1; int b = 2;");
    let state = vm.state();
    assert!(state.finished);
    assert!(!state.locals.contains_key("b"));
    assert_eq!(state.stack, vec![Value::Number(2.0)]);
}

#[test]
fn test_runtime_errors_surface() {
    assert!(matches!(
        run_source("int q = 1 / 0", VmConfig::default()),
        Err(Error::Runtime {
            fault: Fault::DivisionByZero,
            ..
        })
    ));
    assert!(matches!(
        run_source("int x = y", VmConfig::default()),
        Err(Error::Runtime {
            pc: 0,
            fault: Fault::UndefinedVariable { .. }
        })
    ));
    assert!(matches!(
        run_source("int s = 'a' + 1", VmConfig::default()),
        Err(Error::Runtime {
            fault: Fault::TypeMismatch { .. },
            ..
        })
    ));
}

#[test]
fn test_stage_errors_surface() {
    assert!(matches!(
        run_source("int x = 1 $ 2", VmConfig::default()),
        Err(Error::Lex {
            line: 1,
            column: 10,
            ..
        })
    ));
    assert!(matches!(
        run_source("return", VmConfig::default()),
        Err(Error::Parse { .. })
    ));
    assert!(matches!(
        run_source("int x = * 2", VmConfig::default()),
        Err(Error::Compile { .. })
    ));
}

#[test]
fn test_runaway_loop_is_bounded() {
    let config = VmConfig {
        max_steps: Some(1_000),
    };
    assert!(matches!(
        run_source("int i = 1; while (i > 0) int i = i + 1;", config),
        Err(Error::Runtime {
            fault: Fault::StepBudgetExhausted { limit: 1_000 },
            ..
        })
    ));
}

#[test]
fn test_collects_several_parse_errors() {
    let tokens = tokenize("int = 1; int ok = 2; while x; return").unwrap();
    let (program, errors) = parse_recovering(&tokens);
    assert_eq!(errors.len(), 3);
    assert_eq!(program.node.len(), 1);
    for e in &errors {
        assert!(e.position().is_some());
    }
}

#[test]
fn test_step_by_step() {
    let tokens = tokenize("int x = 1 + 2").unwrap();
    let code = compile(&parse(&tokens).unwrap()).unwrap();
    assert_eq!(
        bytecode::disassemble(&code),
        "0000\tPUSH 1\n0001\tPUSH 2\n0002\tADD\n0003\tSTORE \"x\"\n0004\tHALT\n"
    );
    let mut vm = Vm::new();
    vm.load(code);
    let mut pcs = vec![vm.state().pc];
    while vm.step().unwrap() {
        pcs.push(vm.state().pc);
    }
    assert_eq!(pcs, vec![0, 1, 2, 3, 4]);
    let state = vm.state();
    assert!(state.finished);
    assert_eq!(state.locals["x"], Value::Number(3.0));
    assert_eq!(state.tick.count(), 5);
}

#[test]
fn test_snapshot_json() {
    let vm = run("int x = 4; string s = 'hey'");
    let json = serde_json::to_value(vm.state()).unwrap();
    assert_eq!(json["pc"], 4);
    assert_eq!(json["locals"]["x"], 4.0);
    assert_eq!(json["locals"]["s"], "hey");
    assert_eq!(json["finished"], true);
    assert!(json["heap"].as_object().unwrap().is_empty());
    assert!(json["stack"].as_array().unwrap().is_empty());
}

#[test]
fn test_tokens_and_errors_serialize() {
    let tokens = tokenize("x;").unwrap();
    let json = serde_json::to_value(&tokens).unwrap();
    assert_eq!(json[0]["kind"], "Identifier");
    assert_eq!(json[0]["span"]["end"], 1);
    assert_eq!(json[1]["kind"], "Separator");

    let err = tokenize("\"abc").unwrap_err();
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["type"], "Lex");
    assert_eq!(json["column"], 0);
}

#[test]
fn test_json_listing_runs() {
    let code = bytecode::from_json(
        r#"[
            {"opcode": "PUSH", "operand": 4},
            {"opcode": "PUSH", "operand": 2},
            {"opcode": "DIV"},
            {"opcode": "PRINT"},
            {"opcode": "HALT"}
        ]"#,
    )
    .unwrap();
    let mut vm = Vm::new();
    vm.load(code);
    vm.run().unwrap();
    assert_eq!(vm.output(), "2");
    assert!(vm.state().stack.is_empty());
}
