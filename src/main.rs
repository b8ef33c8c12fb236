fn main() -> std::process::ExitCode {
    todo_app_lib::run()
}
