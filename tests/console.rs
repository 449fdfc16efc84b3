use pretty_assertions::assert_eq;
use sharpling::{BufferConsole, Console};

#[test]
fn buffer_captures_writes() {
    let mut console = BufferConsole::new();
    console.write("a").expect("write");
    console.write_line("b").expect("write");
    console.write_line("").expect("write");
    assert_eq!(console.output(), "ab\n\n");
    assert_eq!(console.lines(), vec!["ab", ""]);
}

#[test]
fn queued_input_is_served_in_order() {
    let mut console = BufferConsole::with_input(["one"]);
    console.push_input("two");
    assert_eq!(console.read_line().expect("read"), Some("one".to_string()));
    assert_eq!(console.read_key().expect("read"), Some('t'));
    assert_eq!(console.read_line().expect("read"), None);
}

#[test]
fn empty_line_reads_as_enter_key() {
    let mut console = BufferConsole::with_input([""]);
    assert_eq!(console.read_key().expect("read"), Some('\r'));
}

#[test]
fn take_and_clear_empty_the_buffer() {
    let mut console = BufferConsole::new();
    console.write_line("first").expect("write");
    assert_eq!(console.take_output(), "first\n");
    assert_eq!(console.output(), "");

    console.write_line("second").expect("write");
    console.clear().expect("clear");
    assert_eq!(console.output(), "");
}
